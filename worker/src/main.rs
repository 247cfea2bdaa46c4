//! skyhook-worker
//!
//! stdin carries the meta packet followed by either the job stream
//! (`job` mode) or sideband requests (`operator` mode). stdout is reserved
//! for protocol output; logs go to stderr.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skyhook_core::codec;
use skyhook_core::collaborator::HttpCollaborator;
use skyhook_core::config::{HandlerKind, WorkerConfig, WorkerMode};
use skyhook_core::operator::{build_operator, OperatorContext};
use skyhook_core::pipeline::exit_on_failure;
use skyhook_core::protocol::{
    serve, AccumulateHandler, JobHandler, JobSession, MetaPacket, PerFrameHandler, RawMetaPacket, SidebandWriter,
    StreamContext,
};
use skyhook_core::transform::TransformRegistry;
use skyhook_core::types::Result;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cfg = WorkerConfig::from_env()?;
    let registry = TransformRegistry::with_builtins();
    let factory = registry.factory(&cfg.transform)?;
    info!(mode = ?cfg.mode, transform = %cfg.transform, "worker starting");

    match cfg.mode {
        WorkerMode::Job => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            let mut ctx = StreamContext::open(stdin.lock(), stdout.lock())?;
            let transform = factory()?;

            let handler: Box<dyn JobHandler> = match cfg.handler {
                HandlerKind::PerFrame => Box::new(PerFrameHandler::new(transform)),
                HandlerKind::Accumulate => Box::new(AccumulateHandler::new(transform, ctx.input_types().to_vec())),
            };
            let mut session = JobSession::new(handler);
            let stats = session.run(&mut ctx)?;
            info!(keys = stats.keys_initialized, finished = stats.keys_finished, "worker done");
        }
        WorkerMode::Operator => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let raw: RawMetaPacket = codec::read_frame(&mut input)?;
            let meta = MetaPacket::try_from(raw)?;

            let collaborator = Arc::new(HttpCollaborator::from_meta(&meta)?);
            let acks = SidebandWriter::stdout();
            let ctx = OperatorContext::new(meta, collaborator);
            let mut operator = build_operator(cfg.operator, ctx, factory, cfg.pipeline, acks.clone(), exit_on_failure())?;

            serve(&mut input, operator.as_mut(), &acks)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "worker failed");
            ExitCode::from(e.exit_code())
        }
    }
}
