use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::HashSet;

use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use priority_queue::PriorityQueue;

/// One edge of the routing graph: the index of the connection it represents,
/// weighted by that connection's travel time in minutes.
#[derive(Clone, Debug)]
pub struct RideEdge {
    pub connection_idx: usize,
    pub time: f64,
}

impl RideEdge {
    pub fn new(connection_idx: usize, time: f64) -> RideEdge {
        RideEdge{connection_idx, time}
    }
}

/// Stop tags at the nodes, rides along the edges.
pub type RoutingGraph = DiGraph<String, RideEdge>;


#[derive(Clone, Debug)]
struct QueueNode {
    node_id: usize,
    journey_time: f64,
}

impl QueueNode {
    fn new(node_id: usize, journey_time: f64) -> QueueNode {
        QueueNode{node_id, journey_time}
    }
}

impl Ord for QueueNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse the ordering so the max-priority queue pops low times first
        if self.journey_time < other.journey_time {
            return Ordering::Greater;
        }
        else if self.journey_time > other.journey_time {
            return Ordering::Less;
        }
        else {
            return other.node_id.cmp(&self.node_id);
        }
    }
}

impl PartialOrd for QueueNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl PartialEq for QueueNode {
    fn eq(&self, other: &Self) -> bool {
        return self.cmp(other) == Ordering::Equal;
    }
}

impl Eq for QueueNode{}


/// Cheapest travel-time paths outward from `origin`.  Returns the cost of
/// every settled node, and for each reached node other than the origin, the
/// (previous node, connection index) by which the best path arrives.  When a
/// goal is given the search stops as soon as it is settled.
pub fn dijkstra_with_paths(graph: &RoutingGraph, origin: NodeIndex, goal: Option<NodeIndex>)
    -> (HashMap<NodeIndex, f64>, HashMap<NodeIndex, (NodeIndex, usize)>)
{
    let mut costs = HashMap::new();
    let mut best_arrival = HashMap::new();
    let mut solved = HashSet::new();

    let mut queue = PriorityQueue::new();
    costs.insert(origin, 0.);
    queue.push(origin, QueueNode::new(origin.index(), 0.));

    while let Some((cur_id, cur_node)) = queue.pop() {
        if ! solved.insert(cur_id) {
            continue;
        }
        if goal == Some(cur_id) {
            break;
        }

        for edge in graph.edges_directed(cur_id, Direction::Outgoing) {
            let next_id = edge.target();
            if solved.contains(&next_id) {
                continue;
            }
            let next_cost = cur_node.journey_time + edge.weight().time;
            let is_better = match costs.get(&next_id) {
                Some(cost) => next_cost < *cost,
                None => true,
            };
            if is_better {
                costs.insert(next_id, next_cost);
                best_arrival.insert(next_id, (cur_id, edge.weight().connection_idx));

                let new_node = QueueNode::new(next_id.index(), next_cost);
                // update the priority if it's in the queue, or insert it if not
                if let None = queue.change_priority(&next_id, new_node.clone()) {
                    queue.push(next_id, new_node);
                }
            }
        }
    }

    (costs, best_arrival)
}

/// The ordered connection indexes along the best path from `origin` to
/// `goal`, or None when the search never reached `goal`.
pub fn connection_sequence(best_arrival: &HashMap<NodeIndex, (NodeIndex, usize)>,
                           origin: NodeIndex, goal: NodeIndex) -> Option<Vec<usize>> {
    if origin == goal {
        return Some(vec![]);
    }

    let mut sequence = vec![];
    let mut current = goal;
    while current != origin {
        match best_arrival.get(&current) {
            Some((prev, connection_idx)) => {
                sequence.push(*connection_idx);
                current = *prev;
            }
            None => return None,
        }
    }
    sequence.reverse();

    Some(sequence)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> (RoutingGraph, Vec<NodeIndex>) {
        let mut graph = RoutingGraph::new();
        let nodes: Vec<NodeIndex> = ["a", "b", "c", "d"].iter().
            map(|tag| graph.add_node(String::from(*tag))).collect();
        graph.add_edge(nodes[0], nodes[1], RideEdge::new(0, 2.));
        graph.add_edge(nodes[1], nodes[2], RideEdge::new(1, 3.));
        graph.add_edge(nodes[2], nodes[3], RideEdge::new(2, 4.));
        (graph, nodes)
    }

    #[test]
    fn test_costs_along_a_line() {
        let (graph, nodes) = line_graph();
        let (costs, best_arrival) = dijkstra_with_paths(&graph, nodes[0], None);

        assert_eq!(costs[&nodes[0]], 0.);
        assert_eq!(costs[&nodes[1]], 2.);
        assert_eq!(costs[&nodes[2]], 5.);
        assert_eq!(costs[&nodes[3]], 9.);

        let sequence = connection_sequence(&best_arrival, nodes[0], nodes[3]).unwrap();
        assert_eq!(sequence, vec![0, 1, 2]);
    }

    #[test]
    fn test_picks_the_cheaper_of_two_paths() {
        // a -> b -> d is longer hop-wise but cheaper than a -> c -> d
        let mut graph = RoutingGraph::new();
        let aa = graph.add_node(String::from("a"));
        let bb = graph.add_node(String::from("b"));
        let cc = graph.add_node(String::from("c"));
        let dd = graph.add_node(String::from("d"));
        graph.add_edge(aa, bb, RideEdge::new(0, 1.));
        graph.add_edge(bb, dd, RideEdge::new(1, 1.));
        graph.add_edge(aa, cc, RideEdge::new(2, 1.));
        graph.add_edge(cc, dd, RideEdge::new(3, 5.));

        let (costs, best_arrival) = dijkstra_with_paths(&graph, aa, Some(dd));
        assert_eq!(costs[&dd], 2.);
        let sequence = connection_sequence(&best_arrival, aa, dd).unwrap();
        assert_eq!(sequence, vec![0, 1]);
    }

    #[test]
    fn test_unreachable_node() {
        let mut graph = RoutingGraph::new();
        let aa = graph.add_node(String::from("a"));
        let bb = graph.add_node(String::from("b"));
        let cc = graph.add_node(String::from("c"));
        graph.add_edge(aa, bb, RideEdge::new(0, 1.));
        // c has no incoming edges
        graph.add_edge(cc, bb, RideEdge::new(1, 1.));

        let (costs, best_arrival) = dijkstra_with_paths(&graph, aa, Some(cc));
        assert!(! costs.contains_key(&cc));
        assert!(connection_sequence(&best_arrival, aa, cc).is_none());
    }

    #[test]
    fn test_trivial_path() {
        let (graph, nodes) = line_graph();
        let (costs, best_arrival) = dijkstra_with_paths(&graph, nodes[1], Some(nodes[1]));
        assert_eq!(costs[&nodes[1]], 0.);
        assert_eq!(connection_sequence(&best_arrival, nodes[1], nodes[1]), Some(vec![]));
    }
}
