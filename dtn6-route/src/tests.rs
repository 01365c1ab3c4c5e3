use crate::{LinkId, NextHop, RouteEntry, RouteTable};
use dtn6_eid::EidPattern;

fn link(name: &str) -> LinkId {
    LinkId::from(name)
}

fn to_link(pattern: &str, link_name: &str) -> RouteEntry {
    RouteEntry {
        dest_pattern: pattern.parse().unwrap(),
        next_hop: NextHop::Link(link(link_name)),
    }
}

fn to_alias(pattern: &str, target: &str) -> RouteEntry {
    RouteEntry {
        dest_pattern: pattern.parse().unwrap(),
        next_hop: NextHop::Alias(target.parse().unwrap()),
    }
}

// Scenario 1: route lookup, simple.
#[tokio::test]
async fn get_matching_simple() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
    t.add_entry(to_link("dtn://d2", "l2")).await.unwrap();
    t.add_entry(to_link("dtn://d3", "l3")).await.unwrap();

    let v = t.get_matching(&"dtn://d1".parse().unwrap()).await;
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].next_hop, NextHop::Link(link("l1")));
}

// Scenario 2: route lookup, wildcards — insertion order among matches.
#[tokio::test]
async fn get_matching_wildcards_insertion_order() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
    t.add_entry(to_link("dtn://d2", "l2")).await.unwrap();
    t.add_entry(to_link("dtn://d3", "l3")).await.unwrap();

    t.add_entry(to_link("*:*", "l1")).await.unwrap();
    t.add_entry(to_link("dtn://d2/*", "l2")).await.unwrap();

    let v = t.get_matching(&"dtn://d2".parse().unwrap()).await;
    assert_eq!(v.len(), 3);
    assert_eq!(v[0].dest_pattern, "dtn://d2".parse::<EidPattern>().unwrap());
    assert_eq!(v[1].dest_pattern, "*:*".parse::<EidPattern>().unwrap());
    assert_eq!(v[2].dest_pattern, "dtn://d2/*".parse::<EidPattern>().unwrap());
}

// Scenario 3: route lookup, recursion.
#[tokio::test]
async fn get_matching_recursive_alias_chain() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
    t.add_entry(to_alias("dtn://a1", "dtn://d1")).await.unwrap();
    t.add_entry(to_alias("dtn://a2", "dtn://a1")).await.unwrap();

    let v = t.get_matching(&"dtn://a2".parse().unwrap()).await;
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].dest_pattern, "dtn://d1".parse::<EidPattern>().unwrap());
    assert_eq!(v[0].next_hop, NextHop::Link(link("l1")));
}

// Scenario 4: route lookup, cycle.
#[tokio::test]
async fn get_matching_cycle_yields_zero() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
    t.add_entry(to_alias("dtn://a1", "dtn://d1")).await.unwrap();
    t.add_entry(to_alias("dtn://a2", "dtn://a1")).await.unwrap();

    // Break the only terminal route, then restore a cycle through a2->a1.
    assert_eq!(t.del_entry(&"dtn://d1".parse().unwrap(), &link("l1")).await, 1);

    t.add_entry(to_alias("dtn://a1", "dtn://a6")).await.unwrap();
    t.add_entry(to_alias("dtn://a3", "dtn://a2")).await.unwrap();
    t.add_entry(to_alias("dtn://a4", "dtn://a3")).await.unwrap();
    t.add_entry(to_alias("dtn://a5", "dtn://a4")).await.unwrap();
    t.add_entry(to_alias("dtn://a6", "dtn://a5")).await.unwrap();

    // a1 -> a6 -> a5 -> a4 -> a3 -> a2 -> a1: a genuine cycle via the
    // surviving a2 -> a1 alias from earlier.
    for name in ["a1", "a2", "a3", "a4", "a5", "a6"] {
        let eid = format!("dtn://{name}").parse().unwrap();
        assert_eq!(t.get_matching(&eid).await.len(), 0, "{name} should see zero matches");
    }
}

#[tokio::test]
async fn del_entry_commutativity() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();

    assert_eq!(t.del_entry(&"dtn://d1".parse().unwrap(), &link("l1")).await, 1);
    // Already removed: further deletes of the same pair are no-ops.
    assert_eq!(t.del_entry(&"dtn://d1".parse().unwrap(), &link("l1")).await, 0);
    assert_eq!(t.del_entry(&"dtn://d2".parse().unwrap(), &link("l1")).await, 0);
}

#[tokio::test]
async fn del_entries_bulk_by_pattern() {
    let t = RouteTable::new();
    for _ in 0..3 {
        t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
        t.add_entry(to_link("dtn://d2", "l2")).await.unwrap();
        t.add_entry(to_link("dtn://d3", "l3")).await.unwrap();
    }
    assert_eq!(t.size().await, 9);
    assert_eq!(t.del_entries(&"dtn://d1".parse().unwrap()).await, 3);
    assert_eq!(t.del_entries(&"dtn://d3".parse().unwrap()).await, 3);
    assert_eq!(t.del_entries(&"dtn://d2".parse().unwrap()).await, 3);
    assert_eq!(t.size().await, 0);
}

#[tokio::test]
async fn del_entries_for_nexthop_bulk() {
    let t = RouteTable::new();
    for _ in 0..3 {
        t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
        t.add_entry(to_link("dtn://d2", "l2")).await.unwrap();
        t.add_entry(to_link("dtn://d3", "l3")).await.unwrap();
    }
    assert_eq!(t.del_entries_for_nexthop(&link("l1")).await, 3);
    assert_eq!(t.del_entries_for_nexthop(&link("l3")).await, 3);
    assert_eq!(t.del_entries_for_nexthop(&link("l2")).await, 3);
    assert_eq!(t.size().await, 0);
}

#[tokio::test]
async fn add_entry_rejects_exact_duplicate() {
    let t = RouteTable::new();
    t.add_entry(to_link("dtn://d1", "l1")).await.unwrap();
    assert!(t.add_entry(to_link("dtn://d1", "l1")).await.is_err());
    // Same pattern, different link: not a duplicate.
    t.add_entry(to_link("dtn://d1", "l2")).await.unwrap();
    assert_eq!(t.size().await, 2);
}
