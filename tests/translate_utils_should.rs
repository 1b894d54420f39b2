use rerng_api::server::error::Error;
use rerng_api::server::utils::translate_utils::{Locale, translate};

#[test]
fn test_locale_from_accept_language() {
    assert_eq!(Locale::from_accept_language(None), Locale::En);
    assert_eq!(Locale::from_accept_language(Some("km-KH")), Locale::Km);
    assert_eq!(Locale::from_accept_language(Some("fr-FR, zh;q=0.8")), Locale::Zh);
    assert_eq!(Locale::from_accept_language(Some("de, fr")), Locale::En);
}

#[test]
fn test_fills_placeholders() {
    assert_eq!(
        translate("missing_parameter", &[("name", "keyword")], Locale::En),
        "Missing required parameter: keyword"
    );
    assert_eq!(
        translate("download_started", &[("id", "abc")], Locale::Zh),
        "下载已在后台开始。任务：abc"
    );
}

#[test]
fn test_unknown_message_comes_back_as_its_id() {
    assert_eq!(translate("no_such_message", &[], Locale::Km), "no_such_message");
}

#[test]
fn test_errors_carry_codes_and_translations() {
    let error = Error::ResolutionTimeout(30);

    assert_eq!(error.code(), -3000);
    assert_eq!(error.translated(Locale::En), "Timeout: no media found");
    assert_eq!(
        Error::MissingParameter("url".to_string()).translated(Locale::Km),
        "ខ្វះប៉ារ៉ាម៉ែត្រ៖ url"
    );
}
