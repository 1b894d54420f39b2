const VTT_HEADER: &str = "WEBVTT\n\n";
const CUE_ARROW: &str = "-->";

/// srt -> webvtt, the only real difference the players care about is the decimal separator in
/// the timing lines. cue numbers and text pass through as they are
pub fn srt_to_vtt(srt: &str) -> String {
    let mut vtt = String::with_capacity(srt.len() + VTT_HEADER.len() + 1);
    vtt.push_str(VTT_HEADER);

    for line in srt.split('\n') {
        if line.contains(CUE_ARROW) {
            vtt.push_str(&line.replace(',', "."));
        } else {
            vtt.push_str(line);
        }
        vtt.push('\n');
    }

    vtt
}

/// by extension or by whatever content type the subtitle host sent
pub fn is_srt(path: &str, content_type: Option<&str>) -> bool {
    path.to_ascii_lowercase().ends_with(".srt")
        || content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("srt"))
}
