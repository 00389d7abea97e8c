//! Integration-level property test: a whole frame, header and body,
//! survives being written and read back through the async framer.

use bytes::Bytes;
use proptest::prelude::*;
use wirebolt_proto::{Frame, Opcode};

proptest! {
    #[test]
    fn frame_round_trips_over_an_in_memory_byte_buffer(
        stream in -1_i16..=32767,
        body in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let frame = Frame::request(stream, Opcode::Query, Bytes::from(body));
        let rt = tokio::runtime::Builder::new_current_thread().build().expect("builds a runtime");
        rt.block_on(async {
            let mut wire = Vec::new();
            frame.write(&mut wire, None).await.expect("writes the frame");

            let mut cursor = std::io::Cursor::new(wire);
            let decoded = Frame::read(&mut cursor, 1 << 20, None).await.expect("reads the frame back");

            prop_assert_eq!(decoded.header.stream, frame.header.stream);
            prop_assert_eq!(decoded.header.opcode, frame.header.opcode);
            prop_assert_eq!(decoded.body, frame.body);
            Ok(())
        })?;
    }
}
