use domain_audit_rs::detect::{default_patterns, is_default_page, parse_patterns_str};

#[test]
fn known_placeholder_titles_are_flagged() {
    let patterns = default_patterns();
    let bodies: [&[u8]; 3] = [
        b"<html><head><title>Welcome to nginx!</title></head></html>",
        b"<html><head><title>Apache2 Ubuntu Default Page</title></head></html>",
        b"<html><head><title>IIS Windows Server</title></head></html>",
    ];
    for body in bodies {
        assert!(is_default_page(body, &patterns));
    }
}

#[test]
fn real_content_is_not_flagged() {
    let patterns = default_patterns();
    let body = b"<html><head><title>Acme Widgets - Catalog</title></head><body>buy widgets</body></html>";
    assert!(!is_default_page(body, &patterns));
}

#[test]
fn binary_body_is_never_a_match() {
    let patterns = default_patterns();
    let body = [0x89u8, 0x50, 0x4e, 0x47, 0xff, 0x00, 0x9c];
    assert!(!is_default_page(&body, &patterns));
}

#[test]
fn custom_rule_file_overrides_builtin_list() {
    let rules = parse_patterns_str("acme staging placeholder\n# comment\n");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].pattern, "acme staging placeholder");
    assert!(!rules[0].title_only);
    assert!(is_default_page(
        b"<html><title>ACME Staging Placeholder</title></html>",
        &rules
    ));
    assert!(!is_default_page(
        b"<html><title>Welcome to nginx!</title></html>",
        &rules
    ));
}

#[test]
fn title_prefixed_rules_never_match_bare_bodies() {
    let rules = parse_patterns_str("title: welcome to\n");
    assert!(rules[0].title_only);
    assert!(is_default_page(
        b"<html><title>Welcome to Acme Hosting</title></html>",
        &rules
    ));
    assert!(!is_default_page(
        b"<html><body>welcome to the annual report</body></html>",
        &rules
    ));
}
