//! GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Only north-up grids are handled: the geotransform is stored as
//! ModelPixelScale + ModelTiepoint and the CRS as a single EPSG geokey.
//! Multi-band products are written as one page per band, each page carrying
//! its band name in the PageName tag.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray8};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::raster::{BandStack, GeoTransform, Raster, RasterElement};

const TAG_PAGE_NAME: u16 = 285;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u32 = 1024;
const KEY_RASTER_TYPE: u32 = 1025;
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const KEY_PROJECTED_TYPE: u32 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Value written to the GDAL_NODATA tag, if any.
    pub nodata: Option<f64>,
}

impl GeoTiffOptions {
    pub fn with_nodata(nodata: f64) -> Self {
        Self { nodata: Some(nodata) }
    }
}

fn tiff_error(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{context}: {e}"))
}

/// Read one page of a GeoTIFF file. `page` defaults to the first.
pub fn read_geotiff<T, P>(path: P, page: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder = open_decoder(file)?;
    seek_page(&mut decoder, page.unwrap_or(0))?;
    decode_page(&mut decoder)
}

/// Same as [`read_geotiff`] but from an in-memory buffer, e.g. an asset
/// downloaded over HTTP.
pub fn read_geotiff_from_buffer<T>(data: &[u8], page: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    let mut decoder = open_decoder(Cursor::new(data))?;
    seek_page(&mut decoder, page.unwrap_or(0))?;
    decode_page(&mut decoder)
}

/// Read every page of a file as a named `f64` band stack.
///
/// Pages without a PageName tag are named `band_<n>` (1-based).
pub fn read_band_stack<P: AsRef<Path>>(path: P) -> Result<BandStack> {
    let file = File::open(path.as_ref())?;
    let mut decoder = open_decoder(file)?;
    let mut stack = BandStack::new();
    let mut index = 0;
    loop {
        index += 1;
        let name = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_PAGE_NAME))
            .map(|s| s.trim_end_matches('\0').to_string())
            .unwrap_or_else(|_| format!("band_{index}"));
        let band: Raster<f64> = decode_page(&mut decoder)?;
        stack.push(name, band)?;
        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(tiff_error("cannot advance to next page"))?;
    }
    Ok(stack)
}

fn open_decoder<R: Read + Seek>(reader: R) -> Result<Decoder<R>> {
    Ok(Decoder::new(reader)
        .map_err(tiff_error("TIFF decode error"))?
        .with_limits(Limits::unlimited()))
}

fn seek_page<R: Read + Seek>(decoder: &mut Decoder<R>, page: usize) -> Result<()> {
    for _ in 0..page {
        if !decoder.more_images() {
            return Err(Error::Other(format!("TIFF has no page {page}")));
        }
        decoder
            .next_image()
            .map_err(tiff_error("cannot advance to next page"))?;
    }
    Ok(())
}

fn decode_page<T, R>(decoder: &mut Decoder<R>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_error("cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let result = decoder
        .read_image()
        .map_err(tiff_error("cannot read image data"))?;

    macro_rules! cast_all {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
                .collect::<Vec<T>>()
        };
    }

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_all!(buf),
        DecodingResult::U16(buf) => cast_all!(buf),
        DecodingResult::U32(buf) => cast_all!(buf),
        DecodingResult::I8(buf) => cast_all!(buf),
        DecodingResult::I16(buf) => cast_all!(buf),
        DecodingResult::I32(buf) => cast_all!(buf),
        DecodingResult::F32(buf) => cast_all!(buf),
        DecodingResult::F64(buf) => cast_all!(buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF sample format".into())),
    };

    if data.len() != rows * cols {
        // multi-sample (chunky RGB) pages are not band rasters
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(decoder) {
        raster.set_transform(transform);
    }
    raster.set_epsg(read_epsg(decoder));
    if let Some(nodata) = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
    {
        raster.set_nodata(Some(T::from_f64_or_nodata(nodata)));
    }
    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from the GeoKeyDirectory, projected key first.
fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder
        .get_tag_u32_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
        .ok()?;
    let entries: Vec<&[u32]> = keys.get(4..)?.chunks_exact(4).collect();
    let inline = |key: u32| {
        entries
            .iter()
            .find(|e| e[0] == key && e[1] == 0)
            .map(|e| e[3])
            .filter(|&v| v != 0 && v != 32767)
    };
    inline(KEY_PROJECTED_TYPE).or_else(|| inline(KEY_GEOGRAPHIC_TYPE))
}

struct PageMeta<'a> {
    transform: GeoTransform,
    epsg: Option<u32>,
    nodata: Option<f64>,
    name: Option<&'a str>,
}

fn write_geo_tags<W, K>(dir: &mut DirectoryEncoder<'_, W, K>, meta: &PageMeta<'_>) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let gt = meta.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_error("cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_error("cannot write tiepoint tag"))?;

    // GTRasterType = RasterPixelIsArea, model type and CRS key from the EPSG code
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 0];
    let mut push_key = |key: u32, value: u16| {
        geokeys.extend_from_slice(&[key as u16, 0, 1, value]);
    };
    match meta.epsg {
        Some(4326) => {
            push_key(KEY_MODEL_TYPE, 2);
            push_key(KEY_RASTER_TYPE, 1);
            push_key(KEY_GEOGRAPHIC_TYPE, 4326);
        }
        Some(code) if code <= u16::MAX as u32 => {
            push_key(KEY_MODEL_TYPE, 1);
            push_key(KEY_RASTER_TYPE, 1);
            push_key(KEY_PROJECTED_TYPE, code as u16);
        }
        _ => {
            push_key(KEY_MODEL_TYPE, 1);
            push_key(KEY_RASTER_TYPE, 1);
        }
    }
    geokeys[3] = ((geokeys.len() - 4) / 4) as u16;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(tiff_error("cannot write geokey tag"))?;

    if let Some(nodata) = meta.nodata {
        let text = if nodata.is_nan() { "nan".to_string() } else { nodata.to_string() };
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), text.as_str())
            .map_err(tiff_error("cannot write nodata tag"))?;
    }
    if let Some(name) = meta.name {
        dir.write_tag(Tag::from_u16_exhaustive(TAG_PAGE_NAME), name)
            .map_err(tiff_error("cannot write page name"))?;
    }
    Ok(())
}

fn write_page<W, C>(
    encoder: &mut TiffEncoder<W>,
    data: &[C::Inner],
    rows: usize,
    cols: usize,
    meta: &PageMeta<'_>,
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(tiff_error("cannot create TIFF image"))?;
    write_geo_tags(image.encoder(), meta)?;
    image
        .write_data(data)
        .map_err(tiff_error("cannot write image data"))
}

fn raster_meta<'a, T: RasterElement>(
    raster: &Raster<T>,
    nodata: Option<f64>,
    name: Option<&'a str>,
) -> PageMeta<'a> {
    PageMeta {
        transform: *raster.transform(),
        epsg: raster.epsg(),
        nodata: nodata.or_else(|| raster.nodata().and_then(RasterElement::to_f64)),
        name,
    }
}

/// Write a raster as a single-page 32-bit float GeoTIFF.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_float(raster, file, options.unwrap_or_default())
}

/// Same as [`write_geotiff`] but into a byte buffer.
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_float(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_float<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_error("TIFF encoder error"))?;
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();
    let (rows, cols) = raster.shape();
    let meta = raster_meta(raster, options.nodata, None);
    write_page::<_, Gray32Float>(&mut encoder, &data, rows, cols, &meta)
}

/// Write a class-code raster as an 8-bit GeoTIFF with nodata 255.
pub fn write_class_geotiff<P: AsRef<Path>>(raster: &Raster<u8>, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file).map_err(tiff_error("TIFF encoder error"))?;
    let data: Vec<u8> = raster.data().iter().copied().collect();
    let (rows, cols) = raster.shape();
    let meta = raster_meta(raster, Some(u8::MAX as f64), None);
    write_page::<_, Gray8>(&mut encoder, &data, rows, cols, &meta)
}

/// Write a band stack as a multi-page 32-bit float GeoTIFF, one named page per
/// band. NaN is declared as nodata unless `options` says otherwise.
pub fn write_band_stack<P: AsRef<Path>>(
    stack: &BandStack,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()> {
    if stack.is_empty() {
        return Err(Error::Other("cannot write an empty band stack".into()));
    }
    let nodata = options.and_then(|o| o.nodata).or(Some(f64::NAN));
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file).map_err(tiff_error("TIFF encoder error"))?;
    for (name, band) in stack.iter() {
        let data: Vec<f32> = band.data().iter().map(|&v| v as f32).collect();
        let (rows, cols) = band.shape();
        let meta = raster_meta(band, nodata, Some(name));
        write_page::<_, Gray32Float>(&mut encoder, &data, rows, cols, &meta)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn sample(rows: usize, cols: usize, base: f64) -> Raster<f64> {
        let data = (0..rows * cols).map(|i| base + i as f64 * 0.25).collect();
        let mut r = Raster::from_vec(data, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 2_600_000.0, 30.0, -30.0));
        r.set_epsg(Some(32645));
        r
    }

    #[test]
    fn float_roundtrip_keeps_georeferencing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.tif");
        let r = sample(4, 5, 1.0);
        write_geotiff(&r, &path, None).unwrap();

        let back: Raster<f64> = read_geotiff(&path, None).unwrap();
        assert_eq!(back.shape(), (4, 5));
        assert_eq!(back.epsg(), Some(32645));
        assert!(back.transform().approx_eq(r.transform()));
        assert_relative_eq!(back.get(3, 4).unwrap(), r.get(3, 4).unwrap(), epsilon = 1e-6);
    }

    #[test]
    fn band_stack_pages_keep_names_and_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let mut red = sample(3, 3, 0.1);
        red.set(1, 1, f64::NAN).unwrap();
        let stack = BandStack::from_bands([("red", red), ("nir", sample(3, 3, 0.4))]).unwrap();
        write_band_stack(&stack, &path, None).unwrap();

        let back = read_band_stack(&path).unwrap();
        assert_eq!(back.band_names(), &["red".to_string(), "nir".to_string()]);
        assert!(back.band("red").unwrap().get(1, 1).unwrap().is_nan());

        let nir: Raster<f64> = read_geotiff(&path, Some(1)).unwrap();
        assert_relative_eq!(nir.get(0, 0).unwrap(), 0.4, epsilon = 1e-6);
        assert!(read_geotiff::<f64, _>(&path, Some(2)).is_err());
    }

    #[test]
    fn class_raster_is_eight_bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.tif");
        let mut classes = Raster::filled(2, 2, 3u8);
        classes.set(0, 1, u8::MAX).unwrap();
        classes.set_epsg(Some(4326));
        write_class_geotiff(&classes, &path).unwrap();

        let back: Raster<u8> = read_geotiff(&path, None).unwrap();
        assert_eq!(back.get(0, 0).unwrap(), 3);
        assert_eq!(back.nodata(), Some(u8::MAX));
        assert_eq!(back.epsg(), Some(4326));
    }

    #[test]
    fn buffer_roundtrip() {
        let r = sample(2, 2, 7.0);
        let bytes = write_geotiff_to_buffer(&r, Some(GeoTiffOptions::with_nodata(-9999.0))).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&bytes, None).unwrap();
        assert_relative_eq!(back.get(1, 1).unwrap(), 7.75, epsilon = 1e-6);
        assert_eq!(back.nodata(), Some(-9999.0));
    }
}
