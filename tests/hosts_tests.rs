use domain_audit_rs::hosts::parse_hosts_str;

#[test]
fn parse_mixed_separators_comments_and_dedup() {
    let input = r#"
        # staging fleet
        a.example.com,192.0.2.10
        b.example.com  192.0.2.11   # tab/space separated
        a.example.com,192.0.2.10    # duplicate
    "#;

    let hosts = parse_hosts_str(input).expect("parse ok");
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].domain, "a.example.com");
    assert_eq!(hosts[0].ip, "192.0.2.10");
    assert_eq!(hosts[1].domain, "b.example.com");
}

#[test]
fn same_domain_different_ip_is_kept() {
    let input = "a.example.com,192.0.2.10\na.example.com,192.0.2.11\n";
    let hosts = parse_hosts_str(input).expect("parse ok");
    assert_eq!(hosts.len(), 2);
}

#[test]
fn invalid_ip_rejected_with_line_context() {
    let input = "good.example.com,192.0.2.1\nbad.example.com,999.1.2.3\n";
    let err = parse_hosts_str(input).unwrap_err();
    assert!(format!("{err:#}").contains("line 2"));
}
