// Property tests: resolution against a naive reachability model.

use std::collections::{BTreeSet, HashSet};

use permgraph::authz::types::{Edge, EdgeKind, NodeKind};
use permgraph::authz::{AccessGraph, AccessGraphConfig};
use proptest::prelude::*;

const RESOURCES: usize = 6;
const USERS: usize = 3;
const GROUPS: usize = 3;
const ROLES: [&str; 3] = ["viewer", "editor", "owner"];

fn resource(i: usize) -> String {
    format!("r{i}")
}

fn identity(i: usize) -> String {
    if i < USERS {
        format!("u{i}")
    } else {
        format!("g{}", i - USERS)
    }
}

fn identities() -> impl Iterator<Item = String> {
    (0..USERS + GROUPS).map(identity)
}

fn edge_strategy() -> impl Strategy<Value = Edge> {
    prop_oneof![
        (0..RESOURCES, 0..RESOURCES).prop_map(|(a, b)| Edge::parent_of(resource(a), resource(b))),
        (0..USERS + GROUPS, 0..GROUPS)
            .prop_map(|(i, g)| Edge::member_of(identity(i), format!("g{g}"))),
        (0..USERS + GROUPS, 0..RESOURCES, 0..ROLES.len())
            .prop_map(|(i, r, x)| Edge::has_role(identity(i), resource(r), ROLES[x])),
    ]
}

fn config(cache: bool) -> AccessGraphConfig {
    AccessGraphConfig {
        cache_capacity: if cache { 64 } else { 0 },
        cache_stripes: 4,
        timeout: None,
    }
}

fn build(edges: &[Edge], config: AccessGraphConfig) -> AccessGraph {
    let graph = AccessGraph::new(config);
    for i in 0..RESOURCES {
        let kind = if i == 0 {
            NodeKind::ORGANIZATION
        } else {
            NodeKind::FOLDER
        };
        graph.add_node(resource(i).as_str(), kind).unwrap();
    }
    for i in 0..USERS {
        graph.add_node(identity(i).as_str(), NodeKind::USER).unwrap();
    }
    for g in 0..GROUPS {
        graph.add_node(format!("g{g}").as_str(), NodeKind::GROUP).unwrap();
    }
    for edge in edges {
        graph.add_edge(edge.clone()).unwrap();
    }
    graph
}

fn reach(edges: &[Edge], start: &str, kind: EdgeKind, backward: bool) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
    let mut work = vec![start.to_string()];
    while let Some(node) = work.pop() {
        for edge in edges.iter().filter(|e| e.kind == kind) {
            let (from, to) = if backward {
                (&edge.target, &edge.source)
            } else {
                (&edge.source, &edge.target)
            };
            if from.as_str() == node && seen.insert(to.as_str().to_string()) {
                work.push(to.as_str().to_string());
            }
        }
    }
    seen
}

fn expected(edges: &[Edge], identity: &str, resource: &str) -> BTreeSet<String> {
    let ancestry = reach(edges, resource, EdgeKind::ParentOf, true);
    let membership = reach(edges, identity, EdgeKind::MemberOf, false);
    edges
        .iter()
        .filter(|e| e.kind == EdgeKind::HasRole)
        .filter(|e| membership.contains(e.source.as_str()) && ancestry.contains(e.target.as_str()))
        .filter_map(|e| e.role.as_ref().map(|r| r.as_str().to_string()))
        .collect()
}

fn resolved(graph: &AccessGraph, identity: &str, resource: &str) -> BTreeSet<String> {
    graph
        .effective_permissions(identity, resource)
        .unwrap()
        .iter()
        .map(|r| r.as_str().to_string())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_matches_reachability_model(edges in prop::collection::vec(edge_strategy(), 0..24)) {
        let graph = build(&edges, config(true));
        for i in identities() {
            for r in 0..RESOURCES {
                let r = resource(r);
                prop_assert_eq!(resolved(&graph, &i, &r), expected(&edges, &i, &r));
            }
        }
    }

    #[test]
    fn prop_cache_does_not_change_answers(
        edges in prop::collection::vec(edge_strategy(), 0..24),
        removed in prop::collection::vec(0..24usize, 0..4),
    ) {
        let cached = build(&edges, config(true));
        let uncached = build(&edges, config(false));

        let check = |cached: &AccessGraph, uncached: &AccessGraph| -> Result<(), TestCaseError> {
            for i in identities() {
                for r in 0..RESOURCES {
                    let r = resource(r);
                    for role in ROLES {
                        prop_assert_eq!(
                            cached.has_permission(&i, &r, role).unwrap(),
                            uncached.has_permission(&i, &r, role).unwrap()
                        );
                    }
                }
            }
            Ok(())
        };

        check(&cached, &uncached)?;
        for ix in removed {
            if let Some(edge) = edges.get(ix) {
                cached.remove_edge(edge);
                uncached.remove_edge(edge);
            }
            check(&cached, &uncached)?;
        }
    }

    #[test]
    fn prop_adding_an_edge_is_monotone(
        edges in prop::collection::vec(edge_strategy(), 0..24),
        extra in edge_strategy(),
    ) {
        let graph = build(&edges, config(true));
        let mut before = Vec::new();
        for i in identities() {
            for r in 0..RESOURCES {
                let r = resource(r);
                before.push((i.clone(), r.clone(), resolved(&graph, &i, &r)));
            }
        }

        graph.add_edge(extra).unwrap();

        for (i, r, roles) in before {
            let after = resolved(&graph, &i, &r);
            prop_assert!(after.is_superset(&roles), "{} on {}: {:?} -> {:?}", i, r, roles, after);
        }
    }

    #[test]
    fn prop_replaying_edges_keeps_version(edges in prop::collection::vec(edge_strategy(), 0..24)) {
        let graph = build(&edges, config(true));
        let version = graph.current_version();
        let edge_count = graph.store().edge_count();

        for edge in &edges {
            prop_assert!(!graph.add_edge(edge.clone()).unwrap().changed);
        }
        prop_assert!(!graph.add_node("r0", NodeKind::ORGANIZATION).unwrap().changed);
        prop_assert_eq!(graph.current_version(), version);
        prop_assert_eq!(graph.store().edge_count(), edge_count);
    }

    #[test]
    fn prop_closing_a_cycle_changes_nothing(len in 1..RESOURCES) {
        // chain r0 -> r1 -> ... -> r{len}, grant on the root
        let mut edges: Vec<Edge> = (0..len)
            .map(|i| Edge::parent_of(resource(i), resource(i + 1)))
            .collect();
        edges.push(Edge::has_role("u0", resource(0), "owner"));
        let open = build(&edges, config(false));

        edges.push(Edge::parent_of(resource(len), resource(0)));
        let closed = build(&edges, config(false));

        for r in 0..=len {
            let r = resource(r);
            prop_assert_eq!(resolved(&open, "u0", &r), resolved(&closed, "u0", &r));
        }
    }

    #[test]
    fn prop_diamond_grants_once(width in 2..RESOURCES - 1) {
        // r0 fans out to r1..=width, all of which feed into the last resource
        let sink = resource(RESOURCES - 1);
        let mut edges = vec![Edge::has_role("u0", resource(0), "owner")];
        for mid in 1..=width {
            edges.push(Edge::parent_of(resource(0), resource(mid)));
            edges.push(Edge::parent_of(resource(mid), sink.clone()));
        }
        let graph = build(&edges, config(true));

        let roles = graph.effective_permissions("u0", &sink).unwrap();
        prop_assert_eq!(roles.len(), 1);
        prop_assert!(roles.contains("owner"));
    }
}
