//! Verification Rules
//!
//! Each file in this module contains one rule:
//!
//! - `unique_ids.rs` - No two elements share an ID
//! - `single_start.rs` - Exactly one start event, never a flow target
//! - `dangling_flow.rs` - Flows connect existing, non-flow elements
//! - `boundary_attachment.rs` - Boundary events sit on tasks and lead somewhere
//! - `gateway_exit.rs` - Gateways have a way out that reaches an end

mod boundary_attachment;
mod dangling_flow;
mod gateway_exit;
mod single_start;
mod unique_ids;

pub use boundary_attachment::BoundaryAttachmentRule;
pub use dangling_flow::DanglingFlowRule;
pub use gateway_exit::GatewayExitRule;
pub use single_start::SingleStartRule;
pub use unique_ids::UniqueIdsRule;
