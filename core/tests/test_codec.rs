// Wire codec: frame layout, end-of-stream vs truncation, array headers,
// image coercion and the structured (shape/detection) wire form.

mod common;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::{json, Value};

    use skyhook_core::codec::{
        self, ArrayData, ArrayHeader, ArrayValues, CodecError, DataType, ElementType, GeoImageData, Shape,
        ShapeData, ShapeKind, SpatialMetadata, TypedPayload,
    };
    use skyhook_core::constants::MAX_FRAME_LEN;

    use crate::common::image_chunk;

    fn roundtrip(payload: &TypedPayload) -> TypedPayload {
        let mut buf = Vec::new();
        codec::write_payload(&mut buf, payload).unwrap();
        codec::read_payload(&mut Cursor::new(buf), payload.data_type()).unwrap()
    }

    // ------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------

    #[test]
    fn frame_is_big_endian_length_then_json() {
        let wire = codec::encode_frame(&json!({"Key": "a"})).unwrap();
        let body = br#"{"Key":"a"}"#;

        assert_eq!(&wire[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&wire[4..], body);
    }

    #[test]
    fn empty_stream_is_end_of_stream() {
        let err = codec::read_frame::<_, Value>(&mut Cursor::new(Vec::<u8>::new())).unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn partial_prefix_is_truncated() {
        let err = codec::read_frame::<_, Value>(&mut Cursor::new(vec![0u8, 0])).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream(_)));
    }

    #[test]
    fn short_body_is_truncated() {
        let mut wire = codec::encode_frame(&json!([1, 2, 3])).unwrap();
        wire.truncate(wire.len() - 2);

        let err = codec::read_frame::<_, Value>(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream(_)));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let prefix = ((MAX_FRAME_LEN as u64 + 1) as u32).to_be_bytes().to_vec();
        let err = codec::read_frame::<_, Value>(&mut Cursor::new(prefix)).unwrap_err();
        assert!(!err.is_end_of_stream());
    }

    #[test]
    fn invalid_json_is_malformed() {
        let mut wire = 3u32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"{{{");
        let err = codec::read_frame::<_, Value>(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    // ------------------------------------------------------------
    // Data types
    // ------------------------------------------------------------

    #[test]
    fn generic_tags_map_to_json() {
        for tag in ["json", "geojson", "string", "text", "table", "file"] {
            assert_eq!(tag.parse::<DataType>().unwrap(), DataType::Json);
        }
        assert!(matches!("pointcloud".parse::<DataType>(), Err(CodecError::UnsupportedType(_))));
    }

    // ------------------------------------------------------------
    // Arrays and images
    // ------------------------------------------------------------

    #[test]
    fn image_header_describes_raw_body() {
        let payload = image_chunk(2, 4, 3, 10);
        let mut buf = Vec::new();
        codec::write_payload(&mut buf, &payload).unwrap();

        let mut cur = Cursor::new(buf);
        let header: ArrayHeader = codec::read_frame(&mut cur).unwrap();
        assert_eq!(header.length, 2);
        assert_eq!((header.width, header.height, header.channels), (4, 3, 3));
        assert_eq!(header.element_type, ElementType::Uint8);
        assert_eq!(header.bytes_per_element, 36);
        assert_eq!(header.body_len().unwrap(), 72);
    }

    #[test]
    fn image_roundtrip_keeps_pixels() {
        let payload = image_chunk(3, 2, 2, 7);
        assert_eq!(roundtrip(&payload), payload);
    }

    #[test]
    fn float_image_is_written_as_uint8() {
        let values = ArrayValues::F64(vec![1.0, 2.0, 200.0]);
        let payload = TypedPayload::Image(ArrayData::new(1, 1, 1, 3, values).unwrap());

        match roundtrip(&payload) {
            TypedPayload::Image(a) => assert_eq!(a.values, ArrayValues::U8(vec![1, 2, 200])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn image_with_wrong_channels_is_rejected() {
        let payload = TypedPayload::Image(ArrayData::new(1, 2, 1, 1, ArrayValues::U8(vec![0, 0])).unwrap());
        let mut buf = Vec::new();
        assert!(matches!(codec::write_payload(&mut buf, &payload), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn mismatched_bytes_per_element_is_malformed() {
        let header = ArrayHeader {
            length: 1,
            width: 2,
            height: 2,
            channels: 1,
            element_type: ElementType::Float32,
            bytes_per_element: 4,
            metadata: None,
        };
        assert!(matches!(header.body_len(), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn huge_declared_body_with_short_stream_is_truncated() {
        let header = ArrayHeader {
            length: 1 << 42,
            width: 1,
            height: 1,
            channels: 1,
            element_type: ElementType::Uint8,
            bytes_per_element: 1,
            metadata: None,
        };
        let mut wire = codec::encode_frame(&header).unwrap();
        wire.extend_from_slice(&[1, 2, 3]);

        let err = codec::read_slots(&mut Cursor::new(wire), &[DataType::Array]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream(_)));
    }

    #[test]
    fn zero_length_array_has_no_body() {
        let payload = TypedPayload::Array(ArrayData::empty(ElementType::Int16));
        let mut buf = codec::encode_slots(&[DataType::Array], &[payload]).unwrap();
        // Next frame must be readable right after the header.
        codec::write_payload(&mut buf, &TypedPayload::Int(vec![9])).unwrap();

        let mut cur = Cursor::new(buf);
        let slots = codec::read_slots(&mut cur, &[DataType::Array, DataType::Int]).unwrap();
        assert!(slots[0].is_empty());
        assert_eq!(slots[1], TypedPayload::Int(vec![9]));
    }

    #[test]
    fn array_keeps_element_type() {
        let values = ArrayValues::I32(vec![-1, 2, -3, 4]);
        let payload = TypedPayload::Array(ArrayData::new(2, 2, 1, 1, values).unwrap());
        assert_eq!(roundtrip(&payload), payload);
    }

    #[test]
    fn geoimage_carries_metadata_in_header() {
        let image = ArrayData::image(1, 1, 1, vec![1, 2, 3]).unwrap();
        let payload = TypedPayload::GeoImage(GeoImageData { metadata: json!({"Zoom": 17}), image });

        assert_eq!(payload.len(), 1);
        assert_eq!(roundtrip(&payload), payload);
    }

    // ------------------------------------------------------------
    // Structured payloads
    // ------------------------------------------------------------

    #[test]
    fn shapes_are_flattened_with_counts() {
        let shape = |x| Shape {
            kind: ShapeKind::Point,
            points: vec![[x, x]],
            category: None,
            track_id: None,
            metadata: None,
        };
        let payload = TypedPayload::Shape(ShapeData {
            shapes: vec![vec![shape(1), shape(2)], vec![], vec![shape(3)]],
            metadata: SpatialMetadata { canvas_dims: Some([640, 480]), categories: vec![] },
        });

        let mut buf = Vec::new();
        codec::write_payload(&mut buf, &payload).unwrap();
        let wire: Value = codec::read_frame(&mut Cursor::new(buf.clone())).unwrap();
        assert_eq!(wire["Counts"], json!([2, 0, 1]));
        assert_eq!(wire["Points"].as_array().unwrap().len(), 3);
        assert_eq!(wire["CanvasDims"], json!([640, 480]));

        assert_eq!(roundtrip(&payload), payload);
    }

    #[test]
    fn detection_counts_must_match_entries() {
        let wire = codec::encode_frame(&json!({
            "Counts": [2],
            "Detections": [{"Left": 0, "Top": 0, "Right": 1, "Bottom": 1}],
        }))
        .unwrap();
        let err = codec::read_payload(&mut Cursor::new(wire), DataType::Detection).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    // ------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------

    #[test]
    fn stream_ending_between_slots_is_truncated() {
        let buf = codec::encode_slots(&[DataType::Int], &[TypedPayload::Int(vec![1])]).unwrap();
        let err = codec::read_slots(&mut Cursor::new(buf), &[DataType::Int, DataType::Json]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedStream(_)));
    }

    #[test]
    fn slot_type_mismatch_is_refused_on_write() {
        let err = codec::encode_slots(&[DataType::Json], &[TypedPayload::Int(vec![1])]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
