mod common;

#[cfg(test)]
mod test_random_networks {
    use super::common::{NodeSpec, model_file};
    use bnlearn2rs::bnlearn::reshape_probabilities;
    use bnlearn2rs::load_model;
    use ndarray::{ArrayD, IxDyn, ShapeBuilder};
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::collections::BTreeSet;

    const NAMES: [&str; 8] = ["n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7"];
    const STATES: [&str; 4] = ["s0", "s1", "s2", "s3"];

    fn random_network(rng: &mut StdRng) -> Vec<NodeSpec> {
        let size = rng.gen_range(2..=NAMES.len());
        let mut specs: Vec<NodeSpec> = Vec::with_capacity(size);

        for i in 0..size {
            let card = rng.gen_range(2..=STATES.len());
            let parents: Vec<&'static str> = (0..i)
                .filter(|_| rng.gen_bool(0.4))
                .take(3)
                .map(|p| NAMES[p])
                .collect();
            let columns: usize = parents
                .iter()
                .map(|p| specs.iter().find(|s| s.name == *p).map_or(2, |s| s.states.len()))
                .product();

            let mut probabilities = Vec::with_capacity(card * columns);
            for _ in 0..columns {
                let weights: Vec<f64> = (0..card).map(|_| rng.gen_range(0.05..1.0)).collect();
                let total: f64 = weights.iter().sum();
                probabilities.extend(weights.iter().map(|w| w / total));
            }

            for parent in &parents {
                if let Some(spec) = specs.iter_mut().find(|s| s.name == *parent) {
                    spec.children.push(NAMES[i]);
                }
            }
            let mut spec = NodeSpec::new(NAMES[i], &parents, &[], &probabilities);
            spec.states = STATES[..card].to_vec();
            specs.push(spec);
        }
        specs
    }

    /// Offset of (state, parent states) in R's column-major buffer
    fn column_major_offset(card: usize, state: usize, parent_states: &[usize], parent_cards: &[usize]) -> usize {
        let mut offset = 0;
        let mut stride = card;
        for (&s, &c) in parent_states.iter().zip(parent_cards) {
            offset += s * stride;
            stride *= c;
        }
        state + offset
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(25))]

        #[test]
        fn test_random_networks_convert_faithfully(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let specs = random_network(&mut rng);
            let file = model_file(&specs);
            let (model, cpds) = load_model(file.path()).unwrap();

            let nodes: Vec<&str> = model.nodes().collect();
            let expected_nodes: Vec<&str> = specs.iter().map(|s| s.name).collect();
            prop_assert_eq!(nodes, expected_nodes);

            let edges: BTreeSet<(&str, &str)> = model.edges().into_iter().collect();
            let expected_edges: BTreeSet<(&str, &str)> = specs
                .iter()
                .flat_map(|s| s.parents.iter().map(move |p| (*p, s.name)))
                .collect();
            prop_assert_eq!(edges, expected_edges);

            for spec in &specs {
                let cpd = &cpds[spec.name];
                let parent_cards: Vec<usize> = cpd.evidence_card().to_vec();
                prop_assert_eq!(cpd.variable_card(), spec.states.len());
                prop_assert_eq!(cpd.column_count(), parent_cards.iter().product::<usize>());

                // walk every parent assignment in row-major order
                for column in 0..cpd.column_count() {
                    let mut rest = column;
                    let mut parent_states = vec![0; parent_cards.len()];
                    for (slot, &c) in parent_states.iter_mut().zip(&parent_cards).rev() {
                        *slot = rest % c;
                        rest /= c;
                    }
                    prop_assert_eq!(cpd.column_for(&parent_states), Some(column));
                    for state in 0..cpd.variable_card() {
                        let offset = column_major_offset(
                            cpd.variable_card(),
                            state,
                            &parent_states,
                            &parent_cards,
                        );
                        prop_assert_eq!(
                            cpd.probability(state, &parent_states),
                            Some(spec.probabilities[offset])
                        );
                    }
                }
            }
        }

        #[test]
        fn test_reshape_round_trip_keeps_order(
            dims in prop::collection::vec(1usize..=4, 1..=4),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let len: usize = dims.iter().product();
            let data: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..1.0)).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&dims).f(), data).unwrap();

            let table = reshape_probabilities(&array, dims[0], &dims[1..]).unwrap();
            prop_assert_eq!(table.dim(), (dims[0], len / dims[0]));

            let back = table.into_shape_with_order(IxDyn(&dims)).unwrap();
            prop_assert_eq!(back, array);
        }
    }
}
