//! Transition graph
//!
//! A graph is an ordered list of edges `(from, to) => event`. Looking up a
//! transition scans every edge in definition order and yields the event of
//! each edge that matches; several edges may fire for one transition.

/// State pattern on one side of an edge
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateMatch<S> {
    /// Matches every state
    Any,
    One(S),
    Set(Vec<S>),
}

impl<S: PartialEq> StateMatch<S> {
    pub fn set(states: impl IntoIterator<Item = S>) -> Self {
        StateMatch::Set(states.into_iter().collect())
    }

    pub fn matches(&self, state: &S) -> bool {
        match self {
            StateMatch::Any => true,
            StateMatch::One(s) => s == state,
            StateMatch::Set(states) => states.contains(state),
        }
    }
}

impl<S> From<S> for StateMatch<S> {
    fn from(state: S) -> Self {
        StateMatch::One(state)
    }
}

/// One association
#[derive(Clone, Debug)]
pub struct Edge<S, E> {
    pub from: StateMatch<S>,
    pub to: StateMatch<S>,
    pub event: E,
}

/// Ordered transition → event table
#[derive(Clone, Debug)]
pub struct EventGraph<S, E> {
    edges: Vec<Edge<S, E>>,
}

impl<S: PartialEq, E: Clone> EventGraph<S, E> {
    pub fn new() -> Self {
        EventGraph { edges: Vec::new() }
    }

    /// Append an edge
    pub fn associate(
        mut self,
        from: impl Into<StateMatch<S>>,
        to: impl Into<StateMatch<S>>,
        event: E,
    ) -> Self {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            event,
        });
        self
    }

    /// Events of every edge matching `old -> new`, in definition order
    pub fn associations(&self, old: &S, new: &S) -> Vec<E> {
        self.edges
            .iter()
            .filter(|edge| edge.from.matches(old) && edge.to.matches(new))
            .map(|edge| edge.event.clone())
            .collect()
    }

    pub fn edges(&self) -> &[Edge<S, E>] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl<S: PartialEq, E: Clone> Default for EventGraph<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wildcard_and_specific_edges_both_fire() {
        let graph: EventGraph<u8, &str> = EventGraph::new()
            .associate(StateMatch::Any, 2u8, "any-to-two")
            .associate(1u8, 2u8, "one-to-two")
            .associate(1u8, 3u8, "one-to-three");

        assert_eq!(graph.associations(&1, &2), vec!["any-to-two", "one-to-two"]);
        assert_eq!(graph.associations(&5, &2), vec!["any-to-two"]);
        assert!(graph.associations(&2, &1).is_empty());
    }

    #[test]
    fn test_set_patterns() {
        let graph: EventGraph<u8, char> = EventGraph::new().associate(
            StateMatch::set([1u8, 2]),
            StateMatch::set([7u8, 8]),
            'x',
        );
        assert_eq!(graph.associations(&2, &8), vec!['x']);
        assert!(graph.associations(&3, &8).is_empty());
        assert!(graph.associations(&1, &6).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph: EventGraph<u8, u8> = EventGraph::default();
        assert!(graph.is_empty());
        assert!(graph.associations(&0, &1).is_empty());
    }

    fn pattern() -> impl Strategy<Value = StateMatch<u8>> {
        prop_oneof![
            Just(StateMatch::Any),
            (0u8..4).prop_map(StateMatch::One),
            proptest::collection::vec(0u8..4, 0..3).prop_map(StateMatch::Set),
        ]
    }

    proptest! {
        #[test]
        fn prop_associations_preserve_definition_order(
            edges in proptest::collection::vec((pattern(), pattern()), 0..12),
            old in 0u8..4,
            new in 0u8..4,
        ) {
            let mut graph: EventGraph<u8, usize> = EventGraph::new();
            for (i, (from, to)) in edges.iter().cloned().enumerate() {
                graph = graph.associate(from, to, i);
            }

            let fired = graph.associations(&old, &new);
            let expected: Vec<usize> = edges
                .iter()
                .enumerate()
                .filter(|(_, (from, to))| from.matches(&old) && to.matches(&new))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(fired, expected);
        }
    }
}
