#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::Arc;

    use proptest::prelude::*;
    use replistore::chunk::ChunkConfig;
    use replistore::metadata::{JsonMetadataStore, MetadataStore};
    use replistore::registry::NodeRegistry;
    use replistore::storage::DiskChunkStore;
    use replistore::{ChunkRole, Node, ReplicaStore};
    use tempfile::TempDir;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("can't build runtime")
    }

    fn nodes(base: &std::path::Path, count: usize) -> Vec<Node> {
        (1..=count)
            .map(|i| Node::new(format!("node{}", i), base.join(format!("node{}", i))))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn stored_bytes_come_back_unchanged(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..96,
            node_count in 2usize..5,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let storage = ReplicaStore::new(
                nodes(temp_dir.path(), node_count),
                Arc::new(JsonMetadataStore::in_memory()),
                Arc::new(DiskChunkStore::new()),
                ChunkConfig::new(chunk_size).unwrap(),
            )
            .unwrap();

            let (retrieved, chunks) = runtime().block_on(async {
                let id = storage
                    .store("blob.bin", None, Cursor::new(data.clone()))
                    .await
                    .unwrap()
                    .file_id();
                let chunks = storage.metadata().list_chunks(&id).await.unwrap();
                (storage.retrieve(&id).await.unwrap(), chunks)
            });

            prop_assert_eq!(retrieved, data.clone());
            let expected_chunks = (data.len() + chunk_size - 1) / chunk_size;
            prop_assert_eq!(chunks.len(), expected_chunks * 2);
            prop_assert!(chunks.iter().all(|c| c.path.exists()));
        }

        #[test]
        fn rotation_pairs_two_distinct_nodes(node_count in 2usize..8, start in 0u64..1000) {
            let nodes: Vec<Node> = (0..node_count)
                .map(|i| Node::new(format!("n{}", i), PathBuf::from("/srv").join(format!("n{}", i))))
                .collect();
            let metadata: Arc<dyn MetadataStore> = Arc::new(JsonMetadataStore::in_memory());
            let registry = NodeRegistry::new(nodes, metadata).unwrap();

            for (offset, (primary, replica)) in registry.rotation(start).take(3 * node_count).enumerate() {
                let sequence = start + offset as u64;
                prop_assert_ne!(&primary.id, &replica.id);
                prop_assert_eq!(&primary.id, &registry.node_at(sequence).id);
                prop_assert_eq!(&replica.id, &registry.node_at(sequence + 1).id);
            }
        }

        #[test]
        fn primary_load_counts_one_per_chunk(
            len in 1usize..512,
            chunk_size in 1usize..64,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let storage = ReplicaStore::new(
                nodes(temp_dir.path(), 3),
                Arc::new(JsonMetadataStore::in_memory()),
                Arc::new(DiskChunkStore::new()),
                ChunkConfig::new(chunk_size).unwrap(),
            )
            .unwrap();
            let data = vec![7u8; len];

            let (total_load, primaries) = runtime().block_on(async {
                let id = storage.store("fill.bin", None, Cursor::new(data)).await.unwrap().file_id();
                let mut total = 0;
                for node in storage.registry().nodes() {
                    total += storage.registry().load_of(&node.id).await.unwrap();
                }
                let chunks = storage.metadata().list_chunks(&id).await.unwrap();
                (total, chunks.iter().filter(|c| c.role == ChunkRole::Primary).count() as u64)
            });

            prop_assert_eq!(total_load, primaries);
        }
    }
}
