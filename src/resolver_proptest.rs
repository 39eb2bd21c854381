//! Property-based tests for layer resolution and index merging.
//!
//! Indexes are generated with a small collection pool so that distinct
//! layers regularly share a collection, and with arbitrary dependency edges
//! (including cycles and self edges).

#[cfg(test)]
mod proptest_tests {
    use std::collections::HashSet;

    use crate::index::fixtures::{dependency, index_with_layers};
    use crate::index::Index;
    use crate::resolver::{Resolver, Selection};
    use crate::settings::Settings;
    use proptest::prelude::*;

    fn build_index(collections: &[u8], edges: &[(usize, usize, bool)]) -> Index {
        let names: Vec<String> = (0..collections.len()).map(|i| format!("layer{}", i)).collect();
        let pool: Vec<String> = collections
            .iter()
            .map(|c| if *c == 0 { String::new() } else { format!("col{}", c) })
            .collect();
        let layers: Vec<(u64, &str, &str)> = names
            .iter()
            .zip(pool.iter())
            .enumerate()
            .map(|(i, (name, collection))| (i as u64 + 1, name.as_str(), collection.as_str()))
            .collect();

        let mut index = index_with_layers("Generated", &layers);
        for (id, (from, to, required)) in edges.iter().enumerate() {
            let from = from % collections.len();
            let to = to % collections.len();
            index.layer_dependencies.push(dependency(
                id as u64 + 1,
                101 + from as u64,
                1 + to as u64,
                *required,
            ));
        }
        index
    }

    fn index_strategy() -> impl Strategy<Value = Index> {
        (1usize..8)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(0u8..4, n),
                    prop::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..12),
                )
            })
            .prop_map(|(collections, edges)| build_index(&collections, &edges))
    }

    fn no_base_layers() -> Settings {
        Settings {
            base_layers: Vec::new(),
            ..Settings::default()
        }
    }

    proptest! {
        /// Property: no two accepted layers share a name or a collection
        #[test]
        fn resolution_never_accepts_duplicates(index in index_strategy()) {
            let indexes = vec![index];
            let settings = no_base_layers();
            let resolver = Resolver::new(&indexes, &settings, Some("master")).unwrap();
            let selection = Selection {
                all_layers: true,
                dl_layers: true,
                ..Default::default()
            };
            let resolution = resolver.resolve(&selection).unwrap();

            let mut names = HashSet::new();
            let mut collections = HashSet::new();
            for layer in resolution.layers() {
                prop_assert!(names.insert(layer.name.clone()), "duplicate name {}", layer.name);
                if let Some(collection) = &layer.collection {
                    prop_assert!(
                        collections.insert(collection.clone()),
                        "duplicate collection {}",
                        collection
                    );
                }
            }
        }

        /// Property: every required dependency of a required layer is
        /// represented (by name or collection) among the required layers
        #[test]
        fn required_layers_are_dependency_closed(index in index_strategy()) {
            let indexes = vec![index];
            let settings = no_base_layers();
            let resolver = Resolver::new(&indexes, &settings, Some("master")).unwrap();
            let selection = Selection {
                layers: vec!["layer0".to_string()],
                ..Default::default()
            };
            let resolution = resolver.resolve(&selection).unwrap();
            let index = &indexes[0];

            for layer in &resolution.required {
                let layer_branch = index.layer_branch(layer.layer_branch_id).unwrap();
                let (required, _) = index.dependencies(layer_branch);
                for dep in required {
                    let name = &index.layer_of(dep).unwrap().name;
                    let present = resolution.required.iter().any(|r| {
                        &r.name == name
                            || (dep.collection_name().is_some()
                                && r.collection.as_deref() == dep.collection_name())
                    });
                    prop_assert!(present, "required dependency {} missing", name);
                }
            }
        }

        /// Property: identity-merging an index with itself changes nothing
        #[test]
        fn merging_an_index_with_itself_is_idempotent(index in index_strategy()) {
            let mut document = index.to_document().unwrap();
            document.merge(index.to_document().unwrap()).unwrap();
            let merged = Index::from_document(document, index.config.clone()).unwrap();
            prop_assert_eq!(merged, index);
        }
    }
}
