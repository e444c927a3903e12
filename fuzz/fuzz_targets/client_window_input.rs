#![no_main]

use libfuzzer_sys::fuzz_target;
use winscope_core::WindowId;
use winscope_core::client_window::is_crawler;
use winscope_core::propagation::{add_page_parameters, add_window_id, encode_parameter_value};
use winscope_core::window_id::MAX_WINDOW_ID_LEN;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Anything a client sends as dswid/dspwid either parses into a safe id or is dropped.
    if let Some(id) = WindowId::parse(input) {
        let raw = id.as_str();
        assert!(!raw.is_empty() && raw.len() <= MAX_WINDOW_ID_LEN);
        assert!(raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        assert_eq!(WindowId::parse(raw).as_ref(), Some(&id));

        // Re-adding the same id leaves the url unchanged.
        let url = add_window_id(input, &id);
        let twice = add_window_id(&url, &id);
        assert_eq!(url, twice);
    }

    let encoded = encode_parameter_value(input);
    assert!(encoded.bytes().all(|b| b.is_ascii_graphic()));

    let params = vec![("q".to_string(), input.to_string())];
    let _ = add_page_parameters("/page?x=1", &params, true);
    let _ = is_crawler(input);
});
