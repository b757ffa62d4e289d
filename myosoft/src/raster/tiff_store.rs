//! Multi-page grayscale TIFF, one page per channel, with ImageJ-style
//! calibration metadata.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{Rational, TiffEncoder, TiffValue};
use tiff::tags::{ResolutionUnit, Tag};

use crate::calibration::Calibration;
use crate::raster::{RasterError, RasterImage, RasterResult};
use crate::services::ImageStore;

/// Pixel sizes are stored in millionths of a unit.
const MICRO: u32 = 1_000_000;
const CENTIMETER: u16 = 3;

#[derive(Clone, Copy, Debug, Default)]
pub struct TiffStore;

impl TiffStore {
    pub fn read(path: &Path) -> RasterResult<RasterImage> {
        let file = File::open(path).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let (width, height) = decoder.dimensions()?;
        let calibration = read_calibration(&mut decoder)?;
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut image = RasterImage::new(title, width as usize, height as usize)
            .with_calibration(calibration);

        loop {
            if decoder.dimensions()? != (width, height) {
                return Err(RasterError::UnsupportedSamples(
                    "pages of different size".to_string(),
                ));
            }
            match decoder.colortype()? {
                tiff::ColorType::Gray(_) => {}
                other => {
                    return Err(RasterError::UnsupportedSamples(format!("{other:?}")));
                }
            }

            let plane: Vec<f32> = match decoder.read_image()? {
                DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
                DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
                DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
                DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
                DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
                DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
                DecodingResult::F32(v) => v,
                DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
                _ => {
                    return Err(RasterError::UnsupportedSamples(
                        "64-bit integer samples".to_string(),
                    ));
                }
            };
            image.push_channel(plane)?;

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }

        Ok(image)
    }

    /// Writes 8-bit pages when every sample is an integer in `0..=255`,
    /// 32-bit float pages otherwise.
    pub fn write(image: &RasterImage, path: &Path) -> RasterResult<()> {
        if image.channel_count() == 0 {
            return Err(RasterError::NoChannels);
        }

        let file = File::create(path).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
        let description = image_description(image);
        let as_8bit = image.is_8bit();

        for (index, plane) in image.planes().enumerate() {
            let description = (index == 0).then_some(description.as_str());
            if as_8bit {
                let data: Vec<u8> = plane.iter().map(|&v| v as u8).collect();
                write_page::<colortype::Gray8, _>(&mut encoder, image, &data, description)?;
            } else {
                write_page::<colortype::Gray32Float, _>(&mut encoder, image, plane, description)?;
            }
        }

        Ok(())
    }
}

impl ImageStore for TiffStore {
    fn open(&self, path: &Path) -> anyhow::Result<RasterImage> {
        Ok(Self::read(path)?)
    }

    fn save(&self, image: &RasterImage, path: &Path) -> anyhow::Result<()> {
        Ok(Self::write(image, path)?)
    }

    fn extension(&self) -> &str {
        "tif"
    }
}

fn write_page<C, W>(
    encoder: &mut TiffEncoder<W>,
    image: &RasterImage,
    data: &[C::Inner],
    description: Option<&str>,
) -> RasterResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let mut page = encoder.new_image::<C>(image.width() as u32, image.height() as u32)?;

    if let Some(description) = description {
        page.encoder().write_tag(Tag::ImageDescription, description)?;
    }
    if let Calibration::Scaled {
        pixel_width,
        pixel_height,
        ..
    } = image.calibration()
    {
        page.resolution_unit(ResolutionUnit::None);
        page.x_resolution(per_unit(*pixel_width));
        page.y_resolution(per_unit(*pixel_height));
    }

    page.write_data(data)?;
    Ok(())
}

/// Pixels per unit as `MICRO / round(pixel_size * MICRO)`, so the pixel size
/// reads back as the quotient of two integers.
fn per_unit(pixel_size: f64) -> Rational {
    Rational {
        n: MICRO,
        d: (pixel_size * MICRO as f64).round().clamp(1.0, u32::MAX as f64) as u32,
    }
}

fn image_description(image: &RasterImage) -> String {
    let count = image.channel_count();
    let mut description = format!("ImageJ=1.54f\nimages={count}\nchannels={count}\n");
    if image.calibration().is_scaled() {
        description.push_str(&format!("unit={}\n", image.calibration().unit()));
    }
    description
}

fn read_calibration<R>(decoder: &mut Decoder<R>) -> RasterResult<Calibration>
where
    R: std::io::Read + Seek,
{
    let x = pixel_size(decoder, Tag::XResolution)?;
    let y = pixel_size(decoder, Tag::YResolution)?.or(x);
    let (Some(x), Some(y)) = (x, y) else {
        return Ok(Calibration::Uncalibrated);
    };

    let unit = match decoder.find_tag(Tag::ImageDescription)? {
        Some(tiff::decoder::ifd::Value::Ascii(text)) => text
            .lines()
            .find_map(|line| line.strip_prefix("unit="))
            .map(|unit| unit.replace("\\u00B5", "µ")),
        _ => None,
    };
    let resolution_unit = decoder
        .find_tag(Tag::ResolutionUnit)?
        .and_then(|value| value.into_u16().ok());

    let calibration = match (unit, resolution_unit) {
        (Some(unit), _) if unit != "pixel" => Calibration::scaled(x, y, unit),
        (None, Some(CENTIMETER)) => Calibration::scaled(1e4 * x, 1e4 * y, "micron"),
        _ => Calibration::Uncalibrated,
    };
    Ok(calibration)
}

/// Inverse of a resolution tag: units per pixel.
fn pixel_size<R>(decoder: &mut Decoder<R>, tag: Tag) -> RasterResult<Option<f64>>
where
    R: std::io::Read + Seek,
{
    use tiff::decoder::ifd::Value;

    let size = match decoder.find_tag(tag)? {
        Some(Value::Rational(n, d)) if n != 0 => d as f64 / n as f64,
        Some(Value::Float(v)) => 1.0 / v as f64,
        Some(Value::Double(v)) => 1.0 / v,
        _ => return Ok(None),
    };
    Ok((size.is_finite() && size > 0.0).then_some(size))
}
