//! Decoder registry: encoding type -> decoder.
//!
//! [`Decoder::decode`] is generic over the stream type, so the trait is not
//! object-safe; the registry dispatches through a concrete enum instead.
//! One registry instance belongs to one connection - the Tight and ZRLE
//! entries carry that connection's persistent zlib state.

use crate::{
    CopyRectDecoder, CursorDecoder, DecodeState, Decoder, DesktopSizeDecoder, HextileDecoder,
    RawDecoder, RectData, Rectangle, RfbInStream, RreDecoder, TightDecoder, ZrleDecoder,
};
use anyhow::Result;
use std::collections::HashMap;
use tokio::io::AsyncRead;

/// A concrete decoder wrapper for dispatch over the non-object-safe
/// [`Decoder`] trait.
pub enum DecoderEntry {
    Raw(RawDecoder),
    CopyRect(CopyRectDecoder),
    Rre(RreDecoder),
    Hextile(HextileDecoder),
    Zrle(ZrleDecoder),
    Tight(TightDecoder),
    Cursor(CursorDecoder),
    DesktopSize(DesktopSizeDecoder),
}

impl DecoderEntry {
    pub fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw(d) => d.encoding_type(),
            Self::CopyRect(d) => d.encoding_type(),
            Self::Rre(d) => d.encoding_type(),
            Self::Hextile(d) => d.encoding_type(),
            Self::Zrle(d) => d.encoding_type(),
            Self::Tight(d) => d.encoding_type(),
            Self::Cursor(d) => d.encoding_type(),
            Self::DesktopSize(d) => d.encoding_type(),
        }
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        state: &mut DecodeState,
    ) -> Result<RectData> {
        match self {
            Self::Raw(d) => d.decode(stream, rect, state).await,
            Self::CopyRect(d) => d.decode(stream, rect, state).await,
            Self::Rre(d) => d.decode(stream, rect, state).await,
            Self::Hextile(d) => d.decode(stream, rect, state).await,
            Self::Zrle(d) => d.decode(stream, rect, state).await,
            Self::Tight(d) => d.decode(stream, rect, state).await,
            Self::Cursor(d) => d.decode(stream, rect, state).await,
            Self::DesktopSize(d) => d.decode(stream, rect, state).await,
        }
    }
}

/// Registry of decoders keyed by encoding type.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<i32, DecoderEntry>,
}

impl DecoderRegistry {
    /// Create a registry with the six standard encodings and both
    /// pseudo-encodings registered.
    pub fn with_standard() -> Self {
        let mut registry = Self::default();
        registry.register(DecoderEntry::Raw(RawDecoder));
        registry.register(DecoderEntry::CopyRect(CopyRectDecoder));
        registry.register(DecoderEntry::Rre(RreDecoder));
        registry.register(DecoderEntry::Hextile(HextileDecoder));
        registry.register(DecoderEntry::Zrle(ZrleDecoder::new()));
        registry.register(DecoderEntry::Tight(TightDecoder::default()));
        registry.register(DecoderEntry::Cursor(CursorDecoder));
        registry.register(DecoderEntry::DesktopSize(DesktopSizeDecoder));
        registry
    }

    /// Register a decoder, replacing any previous one for the same
    /// encoding type.
    pub fn register(&mut self, decoder: DecoderEntry) {
        self.decoders.insert(decoder.encoding_type(), decoder);
    }

    /// Look up the decoder for an encoding type.
    pub fn get(&self, encoding: i32) -> Option<&DecoderEntry> {
        self.decoders.get(&encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ENCODING_COPY_RECT, ENCODING_HEXTILE, ENCODING_PSEUDO_CURSOR,
        ENCODING_PSEUDO_DESKTOP_SIZE, ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZRLE,
    };

    #[test]
    fn standard_registry_covers_all_encodings() {
        let registry = DecoderRegistry::with_standard();
        for encoding in [
            ENCODING_RAW,
            ENCODING_COPY_RECT,
            ENCODING_RRE,
            ENCODING_HEXTILE,
            ENCODING_ZRLE,
            ENCODING_TIGHT,
            ENCODING_PSEUDO_CURSOR,
            ENCODING_PSEUDO_DESKTOP_SIZE,
        ] {
            assert!(registry.get(encoding).is_some(), "missing {}", encoding);
        }
        assert!(registry.get(999).is_none());
    }

    #[tokio::test]
    async fn dispatch_reaches_decoder() {
        use rfb_wire::pixel::PixelFormat;
        use std::io::Cursor;

        let registry = DecoderRegistry::with_standard();
        let mut state = DecodeState::new(PixelFormat::rgb32(), 640, 480);
        let mut stream = RfbInStream::new(Cursor::new(vec![0, 5, 0, 6]));
        let rect = Rectangle::new(0, 0, 4, 4);

        let data = registry
            .get(ENCODING_COPY_RECT)
            .unwrap()
            .decode(&mut stream, &rect, &mut state)
            .await
            .unwrap();
        assert_eq!(
            data,
            RectData::CopyRect(crate::CopyRect { src_x: 5, src_y: 6 })
        );
    }
}
