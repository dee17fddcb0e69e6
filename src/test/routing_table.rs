use crate::net::{NodeId, RoutingTable};

fn n(i: usize) -> NodeId {
    NodeId(i)
}

/// 0 - 1 - 2 - 3 chain with links in both directions.
fn chain_adj() -> Vec<Vec<NodeId>> {
    vec![vec![n(1)], vec![n(0), n(2)], vec![n(1), n(3)], vec![n(2)]]
}

#[test]
fn chain_routes_follow_shortest_hop_path() {
    let adj = chain_adj();
    let mut table = RoutingTable::new();
    table.ensure_built(&adj, &adj);

    assert_eq!(table.next_hop(n(0), n(3)), Some(n(1)));
    assert_eq!(table.next_hop(n(1), n(3)), Some(n(2)));
    assert_eq!(table.next_hop(n(2), n(3)), Some(n(3)));
    assert_eq!(table.next_hop(n(3), n(0)), Some(n(2)));
    // No entry for from == dst.
    assert_eq!(table.next_hop(n(2), n(2)), None);
    assert!(!table.is_dirty());
}

#[test]
fn unreachable_destination_has_no_next_hop() {
    // Node 4 is isolated.
    let mut adj = chain_adj();
    adj.push(Vec::new());
    let mut table = RoutingTable::new();
    table.ensure_built(&adj, &adj);

    assert_eq!(table.next_hop(n(0), n(4)), None);
    assert_eq!(table.next_hop(n(4), n(0)), None);
}

#[test]
fn equal_cost_paths_pick_first_neighbor_deterministically() {
    // Diamond: 0 -> {1, 2} -> 3. Both paths cost 2, so the tie must
    // resolve to the first entry of the adjacency list, every time.
    let adj = vec![vec![n(1), n(2)], vec![n(3)], vec![n(3)], vec![]];
    let rev = vec![vec![], vec![n(0)], vec![n(0)], vec![n(1), n(2)]];

    for _ in 0..3 {
        let mut table = RoutingTable::new();
        table.ensure_built(&adj, &rev);
        assert_eq!(table.next_hop(n(0), n(3)), Some(n(1)));
    }
}

#[test]
fn mark_dirty_triggers_rebuild() {
    let adj = chain_adj();
    let mut table = RoutingTable::new();
    table.ensure_built(&adj, &adj);
    assert!(!table.is_dirty());

    table.mark_dirty();
    assert!(table.is_dirty());
    table.ensure_built(&adj, &adj);
    assert!(!table.is_dirty());
    assert_eq!(table.next_hop(n(0), n(2)), Some(n(1)));
}
