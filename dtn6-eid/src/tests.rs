use crate::{Eid, EidPattern, IpnAddress, NULL_EID};
use std::str::FromStr;

#[test]
fn null_eid_is_distinguished() {
    let null = Eid::null();
    assert_eq!(null.to_string(), NULL_EID);
    assert!(null.is_null());
    assert_ne!(null, Eid::from_str("dtn://somewhere").unwrap());
}

#[test]
fn parses_scheme_ssp() {
    let eid: Eid = "dtn://node1/mail".parse().unwrap();
    assert_eq!(eid.scheme(), "dtn");
    assert_eq!(eid.ssp(), "//node1/mail");
    assert!(eid.valid());
}

#[test]
fn rejects_missing_scheme() {
    assert!(Eid::from_str("no-colon-here").is_err());
}

#[test]
fn ipn_specialized_parse() {
    let eid: Eid = "ipn:5.17".parse().unwrap();
    assert_eq!(eid.as_ipn(), Some(IpnAddress { node: 5, service: 17 }));

    let dtn: Eid = "dtn://node1".parse().unwrap();
    assert_eq!(dtn.as_ipn(), None);
}

#[test]
fn ipn_parse_failure_has_no_partial_state() {
    let eid: Eid = "ipn:not-a-number.3".parse().unwrap();
    // Parses fine as a generic EID...
    assert_eq!(eid.scheme(), "ipn");
    // ...but the specialized ipn accessor reports clean failure, not a
    // partially-populated address.
    assert_eq!(eid.as_ipn(), None);
}

#[test]
fn wildcard_any_matches_everything() {
    let pattern: EidPattern = "*:*".parse().unwrap();
    assert!(pattern.matches(&"dtn://x".parse().unwrap()));
    assert!(pattern.matches(&"ipn:1.1".parse().unwrap()));
}

#[test]
fn scheme_wildcard() {
    let pattern: EidPattern = "dtn:*".parse().unwrap();
    assert!(pattern.matches(&"dtn://x".parse().unwrap()));
    assert!(!pattern.matches(&"ipn:1.1".parse().unwrap()));
}

#[test]
fn ssp_prefix_wildcard() {
    let pattern: EidPattern = "dtn://d2/*".parse().unwrap();
    assert!(pattern.matches(&"dtn://d2".parse().unwrap()));
    assert!(pattern.matches(&"dtn://d2/inbox".parse().unwrap()));
    assert!(!pattern.matches(&"dtn://d2inbox".parse().unwrap()));
    assert!(!pattern.matches(&"dtn://d3".parse().unwrap()));
}

#[test]
fn exact_pattern() {
    let pattern: EidPattern = "dtn://d1".parse().unwrap();
    assert!(pattern.matches(&"dtn://d1".parse().unwrap()));
    assert!(!pattern.matches(&"dtn://d1/extra".parse().unwrap()));
}
