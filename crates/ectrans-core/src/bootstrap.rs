//! Synthetic pre-transition epoch for simulation runs.

use std::path::{Path, PathBuf};

use ectrans_error::{Result, TransitionError};
use ectrans_meta::{PlacementRecord, ProvenanceTable, save_placement, stripe_of};
use ectrans_types::{
    BlockIndex, BlockKey, BlockLocation, ClusterSettings, CodingParams, NodeId, ProvenanceEntry,
    TransitionConfig,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Place `num_stripes` stripes, each on `n_pre` distinct nodes drawn
/// uniformly at random. Identical seeds give identical placements.
pub fn generate_pre_placement(
    code: &CodingParams,
    settings: &ClusterSettings,
    seed: u64,
) -> Result<Vec<PlacementRecord>> {
    if code.k_pre == 0 || code.m_pre == 0 {
        return Err(TransitionError::config(format!(
            "pre-transition code ({}, {}) must have non-zero k and m",
            code.k_pre, code.m_pre
        )));
    }
    let width = code.k_pre.checked_add(code.m_pre).ok_or_else(|| {
        TransitionError::config(format!(
            "pre-transition stripe width {} + {} overflows u16",
            code.k_pre, code.m_pre
        ))
    })?;
    if settings.num_nodes < width {
        return Err(TransitionError::config(format!(
            "{} nodes cannot hold a stripe of width {width} on distinct nodes",
            settings.num_nodes
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let records = (0..settings.num_stripes)
        .map(|_| {
            let nodes = sample(
                &mut rng,
                usize::from(settings.num_nodes),
                usize::from(width),
            )
            .into_iter()
            .map(|node| NodeId::new(node as u16))
            .collect();
            PlacementRecord::new(nodes)
        })
        .collect();
    Ok(records)
}

/// One entry per block at `<data_dir>/node_<node>/block_<stripe>_<block>`.
pub fn derive_pre_provenance(
    placement: &[PlacementRecord],
    data_dir: &Path,
) -> Result<ProvenanceTable> {
    let mut table = ProvenanceTable::new();
    for (index, record) in placement.iter().enumerate() {
        let stripe = stripe_of(index)?;
        for (block, &node) in record.nodes().iter().enumerate() {
            let block = u16::try_from(block).map_err(|_| {
                TransitionError::internal(format!("block index {block} exceeds u16"))
            })?;
            let path = data_dir
                .join(node.dir_name())
                .join(format!("block_{stripe}_{block}"));
            table.insert(ProvenanceEntry {
                key: BlockKey {
                    stripe,
                    block: BlockIndex::new(block),
                },
                node,
                location: BlockLocation::Local(path),
            })?;
        }
    }
    Ok(table)
}

/// What [`bootstrap_epoch`] wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub stripes: usize,
    pub blocks: usize,
    pub seed: u64,
    pub pre_placement: PathBuf,
    pub pre_block_mapping: PathBuf,
}

/// Generate and save the pre-transition placement and block mapping named
/// by `config`.
pub fn bootstrap_epoch(config: &TransitionConfig) -> Result<BootstrapSummary> {
    config.validate()?;
    let seed = config.solver.seed;
    let placement = generate_pre_placement(&config.code(), &config.settings(), seed)?;
    let table = derive_pre_provenance(&placement, &config.paths.data_dir)?;

    let pre_placement = config.paths.pre_placement_path();
    let pre_block_mapping = config.paths.pre_block_mapping_path();
    save_placement(&placement, &pre_placement)?;
    table.save(&pre_block_mapping)?;
    info!(
        stripes = placement.len(),
        blocks = table.len(),
        seed,
        placement = %pre_placement.display(),
        "pre-transition epoch generated"
    );
    Ok(BootstrapSummary {
        stripes: placement.len(),
        blocks: table.len(),
        seed,
        pre_placement,
        pre_block_mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_is_deterministic_per_seed() {
        let code = CodingParams::new(4, 2, 8, 2);
        let settings = ClusterSettings::new(16, 32);
        let a = generate_pre_placement(&code, &settings, 7).expect("generate");
        let b = generate_pre_placement(&code, &settings, 7).expect("generate");
        let c = generate_pre_placement(&code, &settings, 8).expect("generate");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn placement_uses_distinct_nodes_in_range() {
        let code = CodingParams::new(6, 3, 12, 3);
        let settings = ClusterSettings::new(9, 50);
        for record in generate_pre_placement(&code, &settings, 1).expect("generate") {
            assert_eq!(record.width(), 9);
            assert!(record.is_spread());
            assert!(record.nodes().iter().all(|node| node.get() < 9));
        }
    }

    #[test]
    fn too_few_nodes_is_config_error() {
        let code = CodingParams::new(4, 2, 8, 2);
        let err = generate_pre_placement(&code, &ClusterSettings::new(5, 4), 0)
            .expect_err("5 < 6");
        assert!(err.is_config());
    }

    #[test]
    fn overflowing_width_is_config_error() {
        let code = CodingParams::new(u16::MAX, 1, u16::MAX, 1);
        let err = generate_pre_placement(&code, &ClusterSettings::new(u16::MAX, 1), 0)
            .expect_err("width overflows u16");
        assert!(err.is_config());
    }

    #[test]
    fn provenance_paths_name_node_and_block() {
        let placement = vec![PlacementRecord::from_raw(&[3, 1, 4])];
        let table = derive_pre_provenance(&placement, Path::new("/data")).expect("derive");
        let (node, location) = table.get(&BlockKey::new(0, 2)).expect("entry");
        assert_eq!(node, NodeId::new(4));
        assert_eq!(location, &BlockLocation::local("/data/node_4/block_0_2"));
        assert_eq!(table.len(), 3);
    }
}
