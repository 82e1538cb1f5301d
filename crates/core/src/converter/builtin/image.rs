//! ImageMagick converters: raster images, PDF pages and plain text rendered to images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::{place_all, place_file};
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

/// Outputs of every ImageMagick converter.
pub const IMAGE_OUTPUTS: &[&str] = &["jpg", "png", "tif", "jp2", "pdf"];

/// Raster outputs, for converters that render through an intermediate PDF.
pub const RASTER_OUTPUTS: &[&str] = &["jpg", "png", "tif", "jp2"];

const DEFAULT_DENSITY: u32 = 150;

static IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("image", &["image"], IMAGE_OUTPUTS)
        .dependency("imagemagick", &["magick", "convert"])
        .timeout_secs(180)
});

static PDF_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("pdf-to-image", &["pdf"], IMAGE_OUTPUTS)
        .dependency("imagemagick", &["magick", "convert"])
        .timeout_secs(180)
});

static PDF_LARGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("pdf-large-to-image", &["pdf-large"], &["tif"])
        .dependency("imagemagick", &["magick", "convert"])
        .timeout_secs(180)
});

static TEXT_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("text-to-image", &["text", "text-to-image"], IMAGE_OUTPUTS)
        .dependency("imagemagick", &["magick", "convert"])
        .timeout_secs(180)
});

pub(crate) fn image_descriptor() -> &'static ConverterDescriptor {
    &IMAGE_DESCRIPTOR
}

pub(crate) fn pdf_to_image_descriptor() -> &'static ConverterDescriptor {
    &PDF_TO_IMAGE_DESCRIPTOR
}

fn pdf_large_descriptor() -> &'static ConverterDescriptor {
    &PDF_LARGE_DESCRIPTOR
}

fn text_to_image_descriptor() -> &'static ConverterDescriptor {
    &TEXT_TO_IMAGE_DESCRIPTOR
}

fn build_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ImageConverter { base })
}

fn build_pdf_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(PdfToImageConverter { base })
}

fn build_pdf_large(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(PdfLargeToImageConverter { base })
}

fn build_text_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(TextToImageConverter { base })
}

pub const IMAGE: ConverterType = ConverterType::new(image_descriptor, build_image);
pub const PDF_TO_IMAGE: ConverterType =
    ConverterType::new(pdf_to_image_descriptor, build_pdf_to_image);
pub const PDF_LARGE_TO_IMAGE: ConverterType =
    ConverterType::new(pdf_large_descriptor, build_pdf_large);
pub const TEXT_TO_IMAGE: ConverterType =
    ConverterType::new(text_to_image_descriptor, build_text_to_image);

/// PRONOM identifiers of the image outputs.
pub fn image_puid(output: &str) -> Option<&'static str> {
    match output {
        "jpg" => Some("fmt/43"),
        "png" => Some("fmt/13"),
        "tif" => Some("fmt/353"),
        "jp2" => Some("x-fmt/392"),
        _ => None,
    }
}

/// Output-specific ImageMagick arguments for plain image conversion.
fn image_args(output: &str) -> Vec<String> {
    match output {
        "tif" => vec!["-compress", "LZW", "-depth", "16", "-coalesce"],
        "pdf" => vec!["-coalesce"],
        _ => vec![],
    }
    .into_iter()
    .map(String::from)
    .collect()
}

/// Highest density reported by `identify` output, and the number of pages.
fn parse_density(stdout: &str, default_density: u32) -> (u32, u32) {
    let mut density = default_density;
    let mut pages = 0;
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        pages += 1;
        let (x, y) = line.split_once(',').unwrap_or((line, line));
        let page_density = [x, y]
            .iter()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .fold(0.0_f64, f64::max)
            .round() as u32;
        density = density.max(page_density);
    }
    (density, pages)
}

/// Maximum DPI of an image or PDF and its page count.
async fn image_dpi(base: &ConverterBase, file: &Path) -> Result<(u32, u32), ConverterError> {
    let magick = base.executable("imagemagick")?;
    let (program, mut args) = if magick.file_stem().is_some_and(|s| s == "magick") {
        (magick, vec!["identify".to_string()])
    } else {
        let name = match magick.extension() {
            Some(ext) => format!("identify.{}", ext.to_string_lossy()),
            None => "identify".to_string(),
        };
        (magick.with_file_name(name), Vec::new())
    };
    args.extend(["-format".to_string(), "%x,%y\\n".to_string(), path_arg(file)]);

    let process = base.run_with(&program, &args, None, true).await?;
    Ok(parse_density(&process.stdout, DEFAULT_DENSITY))
}

/// Places `name` from the scratch directory, or every frame if the tool split it.
async fn place_image(
    tmp_dir: &Path,
    name: &str,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ConverterError> {
    let staged = tmp_dir.join(name);
    if staged.is_file() {
        return Ok(vec![place_file(&staged, &dest_dir.join(name)).await?]);
    }
    // ImageMagick can exit 0 without writing anything.
    let placed = place_all(tmp_dir, dest_dir).await?;
    if placed.is_empty() {
        return Err(ConverterError::conversion_failed("Could not convert file."));
    }
    Ok(placed)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct ImageConverter {
    base: ConverterBase,
}

#[async_trait]
impl Converter for ImageConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        image_puid(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_name = file_name(&self.base.output_file(&dest_dir, output));

        let mut args = vec![path_arg(&self.base.input_path()?)];
        args.extend(image_args(output));
        args.push(dest_name.clone());

        let tmp_dir = self.base.temp_dir(output_dir)?;
        self.base
            .run("imagemagick", &args, Some(tmp_dir.path()))
            .await?;

        place_image(tmp_dir.path(), &dest_name, &dest_dir).await
    }
}

pub struct PdfToImageConverter {
    base: ConverterBase,
}

impl PdfToImageConverter {
    fn arguments(density: u32, output: &str, input: &Path, dest_name: &str) -> Vec<String> {
        let mut args = vec![
            "-density".to_string(),
            density.to_string(),
            "-background".to_string(),
            "white".to_string(),
        ];
        if output == "tif" {
            args.extend(["-compress", "LZW", "-depth", "16"].map(String::from));
        }
        args.push(path_arg(input));
        args.push(dest_name.to_string());
        args
    }
}

#[async_trait]
impl Converter for PdfToImageConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        image_puid(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_name = file_name(&self.base.output_file(&dest_dir, output));
        let input = self.base.input_path()?;

        let (density, _) = image_dpi(&self.base, &input).await?;
        let args = Self::arguments(density * 2, output, &input, &dest_name);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        self.base
            .run("imagemagick", &args, Some(tmp_dir.path()))
            .await?;

        place_image(tmp_dir.path(), &dest_name, &dest_dir).await
    }
}

/// Renders large PDFs one page at a time, then joins the pages into one TIFF.
pub struct PdfLargeToImageConverter {
    base: ConverterBase,
}

#[async_trait]
impl Converter for PdfLargeToImageConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        image_puid(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_name = file_name(&self.base.output_file(&dest_dir, output));
        let input = self.base.input_path()?;

        let (density, pages) = image_dpi(&self.base, &input).await?;
        let density = (density * 2).to_string();

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let pages_dir = tmp_dir.path().join("pages");
        tokio::fs::create_dir_all(&pages_dir).await?;

        for page in 0..pages {
            let args = vec![
                "-density".to_string(),
                density.clone(),
                "-background".to_string(),
                "white".to_string(),
                format!("{}[{}]", path_arg(&input), page),
                format!("page-{page:06}.jpg"),
            ];
            self.base.run("imagemagick", &args, Some(&pages_dir)).await?;
        }

        let args = vec![
            "-density".to_string(),
            density,
            "-compress".to_string(),
            "LZW".to_string(),
            "-depth".to_string(),
            "16".to_string(),
            "page-*.jpg".to_string(),
            path_arg(&tmp_dir.path().join(&dest_name)),
        ];
        self.base.run("imagemagick", &args, Some(&pages_dir)).await?;

        let staged = tmp_dir.path().join(&dest_name);
        Ok(vec![place_file(&staged, &dest_dir.join(&dest_name)).await?])
    }
}

/// Renders a plain text file as white-on-black image.
pub struct TextToImageConverter {
    base: ConverterBase,
}

impl TextToImageConverter {
    /// Canvas size that fits `text` at the rendering point size.
    fn canvas(text: &str) -> (usize, usize) {
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let width = (longest * 10).max(800);
        let height = ((text.matches('\n').count() + 1) * 25).max(600);
        (width, height)
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let encoding = self
            .base
            .file
            .encoding
            .as_ref()
            .and_then(|hint| encoding_rs::Encoding::for_label(hint.encoding.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (text, _, _) = encoding.decode(bytes);
        text.trim().to_string()
    }
}

#[async_trait]
impl Converter for TextToImageConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        image_puid(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_name = file_name(&self.base.output_file(&dest_dir, output));

        let text = self.decode(&tokio::fs::read(self.base.input_path()?).await?);
        let (width, height) = Self::canvas(&text);

        let mut args: Vec<String> = ["-depth", "1", "-density", "200"].map(String::from).to_vec();
        if output == "tif" {
            args.extend(["-compress", "LZW"].map(String::from));
        }
        args.extend([
            "-size".to_string(),
            format!("{width}x{height}"),
            "xc:black".to_string(),
            "-fill".to_string(),
            "white".to_string(),
            "-pointsize".to_string(),
            "20".to_string(),
            "-annotate".to_string(),
            "+5+45".to_string(),
            text,
            dest_name.clone(),
        ]);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        self.base
            .run("imagemagick", &args, Some(tmp_dir.path()))
            .await?;

        place_image(tmp_dir.path(), &dest_name, &dest_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_args() {
        assert_eq!(
            image_args("tif"),
            vec!["-compress", "LZW", "-depth", "16", "-coalesce"]
        );
        assert_eq!(image_args("pdf"), vec!["-coalesce"]);
        assert!(image_args("png").is_empty());
    }

    #[test]
    fn test_parse_density() {
        assert_eq!(parse_density("72,72\n300,300\n", 150), (300, 2));
        assert_eq!(parse_density("72,72\n", 150), (150, 1));
        assert_eq!(parse_density("299.9994,300.0001\n", 150), (300, 1));
        assert_eq!(parse_density("", 150), (150, 0));
    }

    #[test]
    fn test_pdf_to_image_arguments() {
        let args = PdfToImageConverter::arguments(600, "tif", Path::new("/a/b.pdf"), "b.tif");
        assert_eq!(
            args,
            vec![
                "-density", "600", "-background", "white", "-compress", "LZW", "-depth", "16",
                "/a/b.pdf", "b.tif"
            ]
        );
    }

    #[tokio::test]
    async fn test_place_image_single_and_split() {
        let dir = tempfile::TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&scratch).unwrap();

        std::fs::write(scratch.join("b.png"), b"png").unwrap();
        let placed = place_image(&scratch, "b.png", &dest).await.unwrap();
        assert_eq!(placed, vec![dest.join("b.png")]);

        std::fs::write(scratch.join("b-1.png"), b"1").unwrap();
        std::fs::write(scratch.join("b-0.png"), b"0").unwrap();
        let placed = place_image(&scratch, "b.png", &dest).await.unwrap();
        assert_eq!(placed, vec![dest.join("b-0.png"), dest.join("b-1.png")]);
    }

    #[tokio::test]
    async fn test_place_image_fails_when_nothing_was_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&scratch).unwrap();

        let err = place_image(&scratch, "b.png", &dest).await.unwrap_err();

        assert!(matches!(err, ConverterError::ConversionFailed { .. }));
        assert_eq!(err.to_string(), "Could not convert file.");
        assert!(!dest.exists());
    }

    #[test]
    fn test_text_canvas() {
        assert_eq!(TextToImageConverter::canvas("short"), (800, 600));
        let long_line = "x".repeat(100);
        assert_eq!(TextToImageConverter::canvas(&long_line), (1000, 600));
        let many_lines = vec!["a"; 30].join("\n");
        assert_eq!(TextToImageConverter::canvas(&many_lines), (800, 750));
    }

    #[test]
    fn test_descriptors_do_not_overlap() {
        assert!(PDF_TO_IMAGE.descriptor().matches("pdf", "png"));
        assert!(!PDF_TO_IMAGE.descriptor().matches("pdf", "pdfa-2"));
        assert!(PDF_LARGE_TO_IMAGE.descriptor().matches("pdf-large", "tiff"));
        assert!(!PDF_LARGE_TO_IMAGE.descriptor().matches("pdf-large", "png"));
    }
}
