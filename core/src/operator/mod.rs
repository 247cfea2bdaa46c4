//! operator/mod.rs
//! Operators driven over the sideband RPC.
//!
//! - `types`: items, tasks, the `Operator` trait
//! - `tasks`: default inner join of raw items into tasks
//! - `output`: metas frame and chunk encoding for `/build`
//! - `per_frame`, `all_items`, `apply`, `pipelined`: the operator flavours

pub mod types;
pub mod tasks;
pub mod output;
pub mod per_frame;
pub mod all_items;
pub mod apply;
pub mod pipelined;

pub use types::*;
pub use tasks::inner_join;
pub use output::{ChunkEncoder, OutputMeta};
pub use per_frame::PerFrameOperator;
pub use all_items::AllItemsOperator;
pub use apply::{ApplyFn, ApplyOperator};
pub use pipelined::PipelinedOperator;

use crate::config::OperatorKind;
use crate::pipeline::{FailureHook, PipelineProfile, PipelineRuntime, PipelineConfig};
use crate::protocol::SidebandWriter;
use crate::transform::TransformFactory;
use crate::types::Result;

/// Build the operator selected by configuration.
pub fn build_operator(
    kind: OperatorKind,
    ctx: OperatorContext,
    transform: TransformFactory,
    profile: PipelineProfile,
    acks: SidebandWriter,
    on_failure: FailureHook,
) -> Result<Box<dyn Operator>> {
    Ok(match kind {
        OperatorKind::PerFrame => Box::new(PerFrameOperator::new(ctx, transform()?)),
        OperatorKind::AllItems => Box::new(AllItemsOperator::new(ctx, transform()?)),
        OperatorKind::Pipelined => {
            let runtime = PipelineRuntime::start(PipelineConfig {
                meta: ctx.meta,
                collaborator: ctx.collaborator,
                transform,
                profile,
                acks,
                on_failure,
            })?;
            Box::new(PipelinedOperator::new(runtime))
        }
    })
}
