//! Decoding must not depend on how the byte stream is chunked.

use resp_codec::{Frame, RespDecoder};

const SAMPLES: &[&[u8]] = &[
    b"+OK\r\n",
    b"-ERR unknown command\r\n",
    b":1000\r\n",
    b"$-1\r\n",
    b"*3\r\n$9\r\nsubscribe\r\n$18\r\nmessages:published\r\n:1\r\n",
    b"*3\r\n$7\r\nmessage\r\n$18\r\nmessages:published\r\n$67\r\n{\"message_id\":\"11111111-1111-1111-1111-111111111111\",\"payload\":\"x\"}\r\n",
    b"*2\r\n*2\r\n$1\r\na\r\n$0\r\n\r\n*-1\r\n",
];

fn decode_whole(input: &[u8]) -> Frame {
    let mut decoder = RespDecoder::new();
    decoder.feed(input);
    decoder
        .try_decode()
        .expect("valid frame")
        .expect("complete frame")
}

/// Feed `input` in `chunk`-sized pieces, collecting every frame decoded along the way.
fn decode_chunked(input: &[u8], chunk: usize) -> Vec<Frame> {
    let mut decoder = RespDecoder::new();
    let mut frames = Vec::new();

    for piece in input.chunks(chunk) {
        decoder.feed(piece);
        while let Some(frame) = decoder.try_decode().expect("valid frame") {
            frames.push(frame);
        }
    }

    assert_eq!(decoder.buffered(), 0, "all bytes consumed");
    frames
}

#[test]
fn test_byte_by_byte_matches_whole() {
    for sample in SAMPLES {
        let expected = decode_whole(sample);
        assert_eq!(decode_chunked(sample, 1), vec![expected]);
    }
}

#[test]
fn test_every_split_point_matches_whole() {
    for sample in SAMPLES {
        let expected = decode_whole(sample);

        for split in 1..sample.len() {
            let mut decoder = RespDecoder::new();
            decoder.feed(&sample[..split]);
            assert_eq!(
                decoder.try_decode().unwrap(),
                None,
                "frame must stay incomplete when split at {split}"
            );

            decoder.feed(&sample[split..]);
            assert_eq!(decoder.try_decode().unwrap(), Some(expected.clone()));
            assert_eq!(decoder.try_decode().unwrap(), None);
        }
    }
}

#[test]
fn test_chunks_spanning_multiple_frames() {
    let stream: Vec<u8> = SAMPLES.iter().flat_map(|s| s.iter().copied()).collect();
    let expected: Vec<Frame> = SAMPLES.iter().map(|s| decode_whole(s)).collect();

    for chunk in [2, 3, 7, 16, 64, 1024] {
        assert_eq!(decode_chunked(&stream, chunk), expected, "chunk size {chunk}");
    }
}

#[test]
fn test_channel_message_survives_fragmentation() {
    let frame = decode_chunked(SAMPLES[5], 5).remove(0);
    let message = frame.into_channel_message().expect("channel message");

    assert_eq!(&message.channel[..], b"messages:published");
    assert_eq!(
        &message.payload[..],
        br#"{"message_id":"11111111-1111-1111-1111-111111111111","payload":"x"}"#
    );
}
