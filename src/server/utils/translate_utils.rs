use std::collections::HashMap;

use once_cell::sync::Lazy;

/// locales the built-in table knows about, anything else falls back to english
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Km,
    Zh,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Km => "km",
            Self::Zh => "zh",
        }
    }

    /// first supported language tag wins, quality values are ignored since the frontend only
    /// ever sends a single tag anyway
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::En;
        };

        header
            .split(',')
            .filter_map(|tag| {
                let tag = tag.split(';').next()?.trim().to_ascii_lowercase();
                match tag.split('-').next()? {
                    "en" => Some(Self::En),
                    "km" => Some(Self::Km),
                    "zh" => Some(Self::Zh),
                    _ => None,
                }
            })
            .next()
            .unwrap_or_default()
    }
}

type MessageTable = HashMap<&'static str, [&'static str; 3]>;

// [en, km, zh]
static MESSAGES: Lazy<MessageTable> = Lazy::new(|| {
    HashMap::from([
        (
            "scraping_success",
            ["Scraping success", "ការទាញយកទិន្នន័យបានជោគជ័យ", "抓取成功"],
        ),
        (
            "scraping_failed",
            ["Scraping failed", "ការទាញយកទិន្នន័យបរាជ័យ", "抓取失败"],
        ),
        (
            "missing_parameter",
            [
                "Missing required parameter: {{name}}",
                "ខ្វះប៉ារ៉ាម៉ែត្រ៖ {{name}}",
                "缺少必需参数：{{name}}",
            ],
        ),
        (
            "original_source_error",
            [
                "Could not reach the original source",
                "មិនអាចភ្ជាប់ទៅប្រភពដើមបានទេ",
                "无法访问原始来源",
            ],
        ),
        (
            "parse_data_failed",
            ["Failed to parse data", "ការបកស្រាយទិន្នន័យបរាជ័យ", "数据解析失败"],
        ),
        (
            "media_timeout",
            ["Timeout: no media found", "អស់ពេល៖ រកមិនឃើញវីដេអូ", "超时：未找到媒体"],
        ),
        ("no_media_found", ["No media found", "រកមិនឃើញវីដេអូ", "未找到媒体"]),
        (
            "browser_launch_failed",
            [
                "Browser could not be started",
                "មិនអាចបើកកម្មវិធីរុករកបានទេ",
                "无法启动浏览器",
            ],
        ),
        (
            "upstream_fetch_failed",
            ["Failed to fetch media", "ការទាញយកវីដេអូបរាជ័យ", "获取媒体失败"],
        ),
        ("bad_request", ["Bad request", "សំណើមិនត្រឹមត្រូវ", "请求无效"]),
        ("not_found", ["Not found", "រកមិនឃើញ", "未找到"]),
        (
            "internal_error",
            ["Internal server error", "កំហុសម៉ាស៊ីនមេ", "服务器内部错误"],
        ),
        (
            "download_started",
            [
                "Download started in background. Job: {{id}}",
                "ការទាញយកបានចាប់ផ្តើមនៅផ្ទៃខាងក្រោយ។ ការងារ៖ {{id}}",
                "下载已在后台开始。任务：{{id}}",
            ],
        ),
        (
            "download_status",
            ["Download status", "ស្ថានភាពការទាញយក", "下载状态"],
        ),
    ])
});

/// message id -> localized text, `{{name}}` placeholders get filled from params.
/// unknown ids come back as the id itself so a missing entry never breaks a response
pub fn translate(message_id: &str, params: &[(&str, &str)], locale: Locale) -> String {
    let Some(entry) = MESSAGES.get(message_id) else {
        return message_id.to_string();
    };

    let template = match locale {
        Locale::En => entry[0],
        Locale::Km => entry[1],
        Locale::Zh => entry[2],
    };

    params
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{}}}}}", name), value)
        })
}
