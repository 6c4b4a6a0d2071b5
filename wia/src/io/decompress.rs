use std::{io, io::Read};

#[cfg(feature = "compress-lzma")]
use crate::util::compress::{
    lzma2_props_decode, lzma_props_decode, new_lzma2_decoder, new_lzma_decoder,
};
use crate::{
    io::{
        header::{Compression, WIADisc},
        purge::PurgeDecoder,
    },
    Error, Result,
};

/// The decompression method of an archive, with its compressor data.
#[derive(Clone, Debug)]
pub enum Decompressor {
    None,
    Purge,
    #[cfg(feature = "compress-bzip2")]
    Bzip2,
    #[cfg(feature = "compress-lzma")]
    Lzma(Box<[u8]>),
    #[cfg(feature = "compress-lzma")]
    Lzma2(Box<[u8]>),
}

impl Decompressor {
    pub fn new(disc: &WIADisc) -> Result<Self> {
        let data = disc.compr_data();
        match disc.compression() {
            Compression::None => Ok(Self::None),
            Compression::Purge => Ok(Self::Purge),
            #[cfg(feature = "compress-bzip2")]
            Compression::Bzip2 => Ok(Self::Bzip2),
            #[cfg(feature = "compress-lzma")]
            Compression::Lzma => {
                lzma_props_decode(data).map_err(|e| Error::Format(e.to_string()))?;
                Ok(Self::Lzma(Box::from(data)))
            }
            #[cfg(feature = "compress-lzma")]
            Compression::Lzma2 => {
                lzma2_props_decode(data).map_err(|e| Error::Format(e.to_string()))?;
                Ok(Self::Lzma2(Box::from(data)))
            }
            #[allow(unreachable_patterns)]
            comp => Err(Error::Format(format!("Unsupported WIA compression: {}", comp))),
        }
    }

    /// Whether exception lists are stored inside the compressed stream, rather than before it.
    #[inline]
    pub fn compressed_exception_lists(&self) -> bool {
        !matches!(self, Decompressor::None | Decompressor::Purge)
    }

    /// Starts decompressing `window`, whose first `prefix` bytes were already consumed by the
    /// caller. `size` is the expected decompressed size.
    pub fn start<'a>(
        &self,
        window: &'a [u8],
        prefix: usize,
        size: u64,
    ) -> io::Result<DecompressorStream<'a>> {
        let data = window.get(prefix..).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Prefix {:#X} exceeds data size {:#X}", prefix, window.len()),
            )
        })?;
        Ok(match self {
            Decompressor::None => DecompressorStream::None(data),
            Decompressor::Purge => {
                DecompressorStream::Purge(PurgeDecoder::new(window, prefix, size)?)
            }
            #[cfg(feature = "compress-bzip2")]
            Decompressor::Bzip2 => DecompressorStream::Bzip2(bzip2::bufread::BzDecoder::new(data)),
            #[cfg(feature = "compress-lzma")]
            Decompressor::Lzma(props) => {
                let options = lzma_props_decode(props)?;
                DecompressorStream::Lzma(Box::new(new_lzma_decoder(data, &options)?))
            }
            #[cfg(feature = "compress-lzma")]
            Decompressor::Lzma2(props) => {
                let options = lzma2_props_decode(props)?;
                DecompressorStream::Lzma(Box::new(new_lzma2_decoder(data, &options)?))
            }
        })
    }
}

/// A decompression stream over a borrowed window of compressed data.
pub enum DecompressorStream<'a> {
    None(&'a [u8]),
    Purge(PurgeDecoder<'a>),
    #[cfg(feature = "compress-bzip2")]
    Bzip2(bzip2::bufread::BzDecoder<&'a [u8]>),
    #[cfg(feature = "compress-lzma")]
    Lzma(Box<liblzma::bufread::XzDecoder<&'a [u8]>>),
}

impl DecompressorStream<'_> {
    /// Whether all input bytes have been consumed.
    pub fn done_reading(&self) -> bool {
        match self {
            DecompressorStream::None(data) => data.is_empty(),
            DecompressorStream::Purge(decoder) => decoder.done(),
            #[cfg(feature = "compress-bzip2")]
            DecompressorStream::Bzip2(decoder) => decoder.get_ref().is_empty(),
            #[cfg(feature = "compress-lzma")]
            DecompressorStream::Lzma(decoder) => decoder.get_ref().is_empty(),
        }
    }

    fn allows_missing_end(&self) -> bool {
        match self {
            #[cfg(feature = "compress-lzma")]
            DecompressorStream::Lzma(_) => self.done_reading(),
            _ => false,
        }
    }

    /// Drains the stream, failing if it produces more output or leaves input unconsumed.
    ///
    /// LZMA streams may omit the end marker, in which case running out of input after the
    /// expected output counts as the end of the stream.
    pub fn finish(mut self) -> io::Result<()> {
        let mut scratch = [0u8; 1];
        let extra = match self.read(&mut scratch) {
            Ok(extra) => extra,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && self.allows_missing_end() => {
                0
            }
            Err(e) => return Err(e),
        };
        if extra != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Decompressed data is larger than expected",
            ));
        }
        if !self.done_reading() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Compressed data was not fully consumed",
            ));
        }
        Ok(())
    }
}

impl Read for DecompressorStream<'_> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressorStream::None(data) => data.read(buf),
            DecompressorStream::Purge(decoder) => decoder.read(buf),
            #[cfg(feature = "compress-bzip2")]
            DecompressorStream::Bzip2(decoder) => decoder.read(buf),
            #[cfg(feature = "compress-lzma")]
            DecompressorStream::Lzma(decoder) => decoder.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::{big_endian::U32, FromZeros};

    use super::*;

    fn disc(compression: u32, compr_data: &[u8]) -> WIADisc {
        let mut disc = WIADisc::new_zeroed();
        disc.compression = U32::new(compression);
        disc.compr_data_len = compr_data.len() as u8;
        disc.compr_data[..compr_data.len()].copy_from_slice(compr_data);
        disc
    }

    #[test]
    fn test_none_passthrough() {
        let decompressor = Decompressor::new(&disc(0, &[])).unwrap();
        assert!(!decompressor.compressed_exception_lists());
        let window = [9u8, 9, 9, 9, 1, 2, 3];
        let mut stream = decompressor.start(&window, 4, 3).unwrap();
        let mut out = [0u8; 3];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
        assert!(stream.done_reading());
        stream.finish().unwrap();
    }

    #[test]
    fn test_none_extra_data() {
        let decompressor = Decompressor::new(&disc(0, &[])).unwrap();
        let window = [1u8, 2, 3, 4];
        let mut stream = decompressor.start(&window, 0, 3).unwrap();
        let mut out = [0u8; 3];
        stream.read_exact(&mut out).unwrap();
        assert!(stream.finish().is_err());
    }

    #[test]
    fn test_prefix_out_of_range() {
        let decompressor = Decompressor::new(&disc(0, &[])).unwrap();
        assert!(decompressor.start(&[0u8; 4], 8, 0).is_err());
    }

    #[cfg(feature = "compress-bzip2")]
    #[test]
    fn test_bzip2() {
        use std::io::Write;

        let data = b"hello hello hello hello".repeat(100);
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        encoder.write_all(&data).unwrap();
        let window = encoder.finish().unwrap();

        let decompressor = Decompressor::new(&disc(2, &[])).unwrap();
        assert!(decompressor.compressed_exception_lists());
        let mut stream = decompressor.start(&window, 0, data.len() as u64).unwrap();
        let mut out = vec![0u8; data.len()];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
        stream.finish().unwrap();
    }

    #[cfg(feature = "compress-lzma")]
    #[test]
    fn test_lzma_props_rejected() {
        assert!(matches!(Decompressor::new(&disc(3, &[0x5D])), Err(Error::Format(_))));
        assert!(matches!(Decompressor::new(&disc(4, &[41])), Err(Error::Format(_))));
        assert!(Decompressor::new(&disc(4, &[16])).is_ok());
    }

    #[cfg(feature = "compress-lzma")]
    fn lzma1_encode(data: &[u8]) -> Vec<u8> {
        use std::io::Write;

        use liblzma::stream::{Filters, LzmaOptions, Stream};

        let mut options = LzmaOptions::new_preset(6).unwrap();
        options.dict_size(1 << 20);
        let mut filters = Filters::new();
        filters.lzma1(&options);
        let stream = Stream::new_raw_encoder(&filters).unwrap();
        let mut encoder = liblzma::write::XzEncoder::new_stream(Vec::new(), stream);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[cfg(feature = "compress-lzma")]
    #[test]
    fn test_lzma_with_end_marker() {
        let data = b"hello hello hello hello".repeat(100);
        let window = lzma1_encode(&data);
        let decompressor = Decompressor::new(&disc(3, &[0x5D, 0, 0, 0x10, 0])).unwrap();
        let mut stream = decompressor.start(&window, 0, data.len() as u64).unwrap();
        let mut out = vec![0u8; data.len()];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
        stream.finish().unwrap();
    }

    #[cfg(feature = "compress-lzma")]
    #[test]
    fn test_lzma_without_end_marker() {
        let data = b"hello hello hello hello".repeat(100);
        let mut window = lzma1_encode(&data);
        // Drop the range coder flush that follows the end marker
        window.truncate(window.len() - 4);
        let decompressor = Decompressor::new(&disc(3, &[0x5D, 0, 0, 0x10, 0])).unwrap();
        let mut stream = decompressor.start(&window, 0, data.len() as u64).unwrap();
        let mut out = vec![0u8; data.len()];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
        stream.finish().unwrap();

        // Running out of input before the expected output is still an error
        let half = &window[..window.len() / 2];
        let mut stream = decompressor.start(half, 0, data.len() as u64).unwrap();
        let mut out = vec![0u8; data.len()];
        assert!(stream.read_exact(&mut out).is_err());
    }
}
