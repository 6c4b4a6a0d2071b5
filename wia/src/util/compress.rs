//! Conversion of 7-Zip SDK style compressor properties into liblzma decoder filters.

#[cfg(feature = "compress-lzma")]
use std::io;

#[cfg(feature = "compress-lzma")]
fn new_options() -> io::Result<liblzma::stream::LzmaOptions> {
    // Every field the decoder relies on is overwritten below.
    liblzma::stream::LzmaOptions::new_preset(6).map_err(io::Error::from)
}

/// Decodes the LZMA Properties byte (lc/lp/pb).
/// See `lzma_lzma_lclppb_decode` in `liblzma/lzma/lzma_decoder.c`.
#[cfg(feature = "compress-lzma")]
pub fn lzma_lclppb_decode(options: &mut liblzma::stream::LzmaOptions, byte: u8) -> io::Result<()> {
    let mut d = byte as u32;
    if d >= (9 * 5 * 5) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid LZMA props byte: {}", d),
        ));
    }
    options.literal_context_bits(d % 9);
    d /= 9;
    options.position_bits(d / 5);
    options.literal_position_bits(d % 5);
    Ok(())
}

/// Decodes LZMA properties.
/// See `lzma_lzma_props_decode` in `liblzma/lzma/lzma_decoder.c`.
#[cfg(feature = "compress-lzma")]
pub fn lzma_props_decode(props: &[u8]) -> io::Result<liblzma::stream::LzmaOptions> {
    use crate::array_ref;
    if props.len() != 5 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid LZMA props length: {}", props.len()),
        ));
    }
    let mut options = new_options()?;
    lzma_lclppb_decode(&mut options, props[0])?;
    options.dict_size(u32::from_le_bytes(*array_ref!(props, 1, 4)));
    Ok(options)
}

/// Decodes the LZMA2 dictionary size.
/// See `lzma_lzma2_props_decode` in `liblzma/lzma/lzma2_decoder.c`.
pub fn lzma2_dict_size(props: &[u8]) -> Result<u32, String> {
    use std::cmp::Ordering;
    if props.len() != 1 {
        return Err(format!("Invalid LZMA2 props length: {}", props.len()));
    }
    let d = props[0] as u32;
    match d.cmp(&40) {
        Ordering::Greater => Err(format!("Invalid LZMA2 props byte: {}", d)),
        Ordering::Equal => Ok(u32::MAX),
        Ordering::Less => Ok((2 | (d & 1)) << (d / 2 + 11)),
    }
}

/// Decodes LZMA2 properties.
#[cfg(feature = "compress-lzma")]
pub fn lzma2_props_decode(props: &[u8]) -> io::Result<liblzma::stream::LzmaOptions> {
    let dict_size =
        lzma2_dict_size(props).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut options = new_options()?;
    options.dict_size(dict_size);
    Ok(options)
}

/// Creates a new raw LZMA decoder with the given options.
#[cfg(feature = "compress-lzma")]
pub fn new_lzma_decoder<R>(
    reader: R,
    options: &liblzma::stream::LzmaOptions,
) -> io::Result<liblzma::bufread::XzDecoder<R>>
where
    R: io::BufRead,
{
    let mut filters = liblzma::stream::Filters::new();
    filters.lzma1(options);
    let stream = liblzma::stream::Stream::new_raw_decoder(&filters).map_err(io::Error::from)?;
    Ok(liblzma::bufread::XzDecoder::new_stream(reader, stream))
}

/// Creates a new raw LZMA2 decoder with the given options.
#[cfg(feature = "compress-lzma")]
pub fn new_lzma2_decoder<R>(
    reader: R,
    options: &liblzma::stream::LzmaOptions,
) -> io::Result<liblzma::bufread::XzDecoder<R>>
where
    R: io::BufRead,
{
    let mut filters = liblzma::stream::Filters::new();
    filters.lzma2(options);
    let stream = liblzma::stream::Stream::new_raw_decoder(&filters).map_err(io::Error::from)?;
    Ok(liblzma::bufread::XzDecoder::new_stream(reader, stream))
}
