use serde::Serialize;
use tracing::debug;

use crate::codec::{self, TypedPayload};
use crate::operator::types::{ApplyOutcome, Operator, OperatorContext, RequestId, Task};
use crate::protocol::Dataset;
use crate::transform::{Element, Transform};
use crate::types::{Result, WorkerError};

/// Header frame of a `/write-item` body.
#[derive(Debug, Serialize)]
struct WriteItemHeader<'a> {
    #[serde(rename = "Dataset")]
    dataset: &'a Dataset,
    #[serde(rename = "Key")]
    key: &'a str,
}

/// Loads every input item whole, runs the transform once and writes one
/// item per output.
pub struct AllItemsOperator {
    ctx: OperatorContext,
    transform: Box<dyn Transform>,
}

impl AllItemsOperator {
    pub fn new(ctx: OperatorContext, transform: Box<dyn Transform>) -> Self {
        Self { ctx, transform }
    }
}

impl Operator for AllItemsOperator {
    fn apply(&mut self, request_id: RequestId, task: Task) -> Result<ApplyOutcome> {
        let items = task.input_items();
        let input_types = self.ctx.meta.input_types();
        if items.len() != input_types.len() {
            return Err(WorkerError::ProtocolViolation(format!(
                "task {} has {} input items for {} inputs",
                task.key,
                items.len(),
                input_types.len()
            )));
        }

        let inputs = items
            .iter()
            .zip(&input_types)
            .map(|(item, dt)| -> Result<Element> {
                let mut reader = self.ctx.collaborator.load_data(item)?;
                let data = codec::read_payload(&mut reader, *dt)?;
                Ok(Element::new(data, item.metadata()))
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = self.transform.apply_checked(&inputs, &self.ctx.meta.output_types())?;

        for (dataset, output) in self.ctx.meta.outputs.iter().zip(outputs) {
            let body = write_item_body(dataset, &task.key, &output.data)?;
            self.ctx.collaborator.write_item(body)?;
        }

        debug!(request_id, key = %task.key, "all-items task written");
        Ok(ApplyOutcome::Completed)
    }
}

fn write_item_body(dataset: &Dataset, key: &str, payload: &TypedPayload) -> Result<Vec<u8>> {
    let mut body = codec::encode_frame(&WriteItemHeader { dataset, key })?;
    codec::write_payload(&mut body, payload)?;
    Ok(body)
}
