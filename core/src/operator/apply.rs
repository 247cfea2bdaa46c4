use crate::operator::types::{ApplyOutcome, Operator, OperatorContext, RequestId, Task};
use crate::types::Result;

pub type ApplyFn = Box<dyn FnMut(&OperatorContext, &Task) -> Result<()> + Send>;

/// Operator defined by a bare function; tasks come from the default join.
pub struct ApplyOperator {
    ctx: OperatorContext,
    apply: ApplyFn,
}

impl ApplyOperator {
    pub fn new<F>(ctx: OperatorContext, apply: F) -> Self
    where
        F: FnMut(&OperatorContext, &Task) -> Result<()> + Send + 'static,
    {
        Self { ctx, apply: Box::new(apply) }
    }
}

impl Operator for ApplyOperator {
    fn apply(&mut self, _request_id: RequestId, task: Task) -> Result<ApplyOutcome> {
        (self.apply)(&self.ctx, &task)?;
        Ok(ApplyOutcome::Completed)
    }
}
