use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{serial::error::SerialPortError, transport::Frame};

/// This codec splits incoming bytes on a delimiter character.
/// A carriage return right before the delimiter is dropped as well,
/// since some boards end their lines with `\r\n`.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a newline into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
        }
    }

    /// Return a [FrameCodec], which does the same thing as the underlying [LinesCodec].
    /// The difference is that it yields text frames.
    pub fn into_frame_codec(self) -> FrameCodec {
        FrameCodec { wrapped: self }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n')
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();

        let look_at = &src[self.cursor..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == self.read_delimiter) {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            // Split at the delimiter, getting a slice of the bytes before it.
            let mut line = src.split_to(actual_position);

            // Discard the delimiter by advancing the source buffer beyond it.
            src.advance(1);

            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            Ok(Some(line[..].to_vec()))
        } else {
            // We did not find a full frame.
            // The next time we are called the same buffer `src` will be provided to us (same starting point),
            // but possibly with more data.
            self.cursor = read_to;

            Ok(None)
        }
    }
}

/// This does the same thing as the underlying [LinesCodec],
/// but yields [`Frame`]s. Bad utf8 is replaced rather than failing the stream,
/// since a failed stream would end the read half of the link.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    wrapped: LinesCodec,
}

impl Default for FrameCodec {
    fn default() -> Self {
        LinesCodec::default().into_frame_codec()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.wrapped.decode(src)?.map(Frame::new_lossy))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode_all(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut frames = vec![];
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame.as_str().to_owned());
        }
        frames
    }

    #[test]
    fn partial_line_waits_for_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"E,2,"[..]);

        assert!(decode_all(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b"5\nD hel");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["E,2,5"]);

        buf.extend_from_slice(b"lo\r\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["D hello"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_lines_are_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"\n\r\nE,#,x\n"[..]);

        assert_eq!(decode_all(&mut codec, &mut buf), vec!["", "", "E,#,x"]);
    }

    #[test]
    fn bad_utf8_is_replaced() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"!bad \xff byte\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("!bad "));
        assert!(frames[0].ends_with(" byte"));
    }
}
