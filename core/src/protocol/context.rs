use std::io::{Read, Write};

use tracing::debug;

use crate::codec::{self, CodecError, DataType, TypedPayload};
use crate::protocol::types::{ControlFrame, MetaPacket, OutputFrame, RawMetaPacket};
use crate::types::Result;

/// Where handlers write their results.
pub trait OutputSink {
    fn output_types(&self) -> &[DataType];

    /// `data_data` frame followed by one payload per output slot.
    fn emit_data(&mut self, key: &str, output_key: &str, outputs: &[TypedPayload]) -> Result<()>;

    fn emit_data_finish(&mut self, key: &str, output_key: &str) -> Result<()>;

    fn emit_finish(&mut self, key: &str) -> Result<()>;
}

/// Reader, writer and meta packet of one worker stream.
///
/// Built once at process start and passed explicitly to every protocol call.
pub struct StreamContext<R, W> {
    reader: R,
    writer: W,
    meta: MetaPacket,
    input_types: Vec<DataType>,
    output_types: Vec<DataType>,
}

impl<R: Read, W: Write> StreamContext<R, W> {
    /// Read the meta packet and build the context.
    pub fn open(mut reader: R, writer: W) -> Result<Self> {
        let raw: RawMetaPacket = codec::read_frame(&mut reader)?;
        let meta = MetaPacket::try_from(raw)?;
        debug!(inputs = ?meta.input_types(), outputs = ?meta.output_types(), "meta packet received");
        Ok(Self::with_meta(reader, writer, meta))
    }

    pub fn with_meta(reader: R, writer: W, meta: MetaPacket) -> Self {
        let input_types = meta.input_types();
        let output_types = meta.output_types();
        Self { reader, writer, meta, input_types, output_types }
    }

    pub fn meta(&self) -> &MetaPacket {
        &self.meta
    }

    pub fn input_types(&self) -> &[DataType] {
        &self.input_types
    }

    /// Next control frame, or `None` on a clean end of stream.
    pub fn next_control(&mut self) -> Result<Option<ControlFrame>> {
        match codec::read_frame(&mut self.reader) {
            Ok(frame) => Ok(Some(frame)),
            Err(CodecError::EndOfStream) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Payload frames following a `job` frame, one per input slot.
    pub fn read_inputs(&mut self) -> Result<Vec<TypedPayload>> {
        match codec::read_slots(&mut self.reader, &self.input_types) {
            Err(CodecError::EndOfStream) if !self.input_types.is_empty() => Err(CodecError::TruncatedStream(
                "stream ended before the job payload".to_string(),
            )
            .into()),
            other => Ok(other?),
        }
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_parts(self) -> (R, W, MetaPacket) {
        (self.reader, self.writer, self.meta)
    }

    fn write_buffer(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<R: Read, W: Write> OutputSink for StreamContext<R, W> {
    fn output_types(&self) -> &[DataType] {
        &self.output_types
    }

    fn emit_data(&mut self, key: &str, output_key: &str, outputs: &[TypedPayload]) -> Result<()> {
        let length = outputs.first().map(TypedPayload::len).unwrap_or(0);
        let mut buf = codec::encode_frame(&OutputFrame::DataData {
            key: key.to_string(),
            output_key: output_key.to_string(),
            length,
        })?;
        codec::write_slots(&mut buf, &self.output_types, outputs)?;
        self.write_buffer(&buf)
    }

    fn emit_data_finish(&mut self, key: &str, output_key: &str) -> Result<()> {
        let buf = codec::encode_frame(&OutputFrame::DataFinish {
            key: key.to_string(),
            output_key: output_key.to_string(),
        })?;
        self.write_buffer(&buf)
    }

    fn emit_finish(&mut self, key: &str) -> Result<()> {
        let buf = codec::encode_frame(&OutputFrame::Finish { key: key.to_string() })?;
        self.write_buffer(&buf)
    }
}
