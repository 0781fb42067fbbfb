//! The diagnostic toggles are process-wide, so everything touching them
//! lives in one test to keep it independent of test ordering.

use symcodec::container::FLAGS_MARKER;
use symcodec::diagnostics::{self, RenderSettings, DEFAULT_BYTES_CAP};
use symcodec::{container, Container};

#[test]
fn test_global_toggles_drive_rendering() {
    let config = diagnostics::global();
    config.reset();
    assert_eq!(config.settings(), RenderSettings::default());
    assert_eq!(config.settings().bytes_cap, DEFAULT_BYTES_CAP);

    let c = container! {
        FLAGS_MARKER => true,
        "on" => true,
        "off" => false,
        "blob" => vec![0u8; 40],
    };

    let text = c.render_expanded();
    assert!(!text.contains("off"));
    assert!(!text.contains(FLAGS_MARKER));
    assert!(text.contains("(truncated, total 40)"));

    config.set_print_false_flags(true);
    config.set_print_private_entries(true);
    config.set_print_full_strings(true);
    let text = c.render_expanded();
    assert!(text.contains("off = false"));
    assert!(text.contains(&format!("{FLAGS_MARKER} = true")));
    assert!(text.contains("(total 40)") && !text.contains("truncated"));
    // Display goes through the same global configuration
    assert_eq!(format!("{c}"), text);

    // the toggles never change what equality sees
    assert_eq!(c, container! { "on" => true, "off" => false, "blob" => vec![0u8; 40] });

    let loaded = RenderSettings::from_json(br#"{ "bytes_cap": 4, "false_flags": true }"#).unwrap();
    assert!(!loaded.full_strings);
    config.apply(&loaded);
    let text = c.render_expanded();
    assert!(text.contains("off = false"));
    assert!(!text.contains(FLAGS_MARKER));
    assert!(text.contains("b\"\\x00\\x00\\x00\\x00\"... (truncated, total 40)"));

    config.reset();
    assert_eq!(Container::new().render_expanded(), "Container: ");
}
