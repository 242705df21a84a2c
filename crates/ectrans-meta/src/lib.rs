//! On-disk metadata of a redundancy transition.
//!
//! Three plain-text formats, all newline-terminated rows of space-separated
//! tokens without a header:
//! - placement: `k+m` node ids per stripe
//! - block provenance: `stripe_id block_index node_id location`
//! - stripe-group metadata: `lambda` pre-stripe ids, method id, `k+m` node ids

pub mod placement;
pub mod provenance;
pub mod stripe_group;
pub mod text;

pub use placement::{
    PlacementRecord, PlacementShape, load_placement, render_placement, save_placement, stripe_of,
};
pub use provenance::ProvenanceTable;
pub use stripe_group::{
    StripeGroupRecord, StripeGroupShape, parse_stripe_groups, render_stripe_groups,
    save_stripe_groups,
};
pub use text::write_atomic;
