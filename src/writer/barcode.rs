//! QR code generation for signature stamps.
//!
//! Encodes the stamp payload into a module matrix with the `qrcode` crate and
//! rasterises it into a grayscale image that can be embedded in a PDF as an
//! Image XObject.
//!
//! ## Example
//!
//! ```
//! use pades_signer::writer::barcode::{BarcodeGenerator, QrCodeOptions};
//!
//! let matrix = BarcodeGenerator::generate_qr("Name: Dr. Ana Souza", &QrCodeOptions::default())?;
//! let raster = matrix.to_gray_image(&QrCodeOptions::default());
//! assert_eq!(raster.width(), raster.height());
//! # Ok::<(), pades_signer::Error>(())
//! ```

use crate::error::{Error, Result};

/// QR code error correction levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrErrorCorrection {
    /// Low (~7% correction capability)
    Low,
    /// Medium (~15% correction capability)
    #[default]
    Medium,
    /// Quartile (~25% correction capability)
    Quartile,
    /// High (~30% correction capability)
    High,
}

/// Options for QR code generation.
#[derive(Debug, Clone)]
pub struct QrCodeOptions {
    /// Pixels per module in the raster
    pub module_size: u32,
    /// Error correction level
    pub error_correction: QrErrorCorrection,
    /// Quiet zone (border) in modules
    pub quiet_zone: u32,
    /// Foreground gray level (0 = black)
    pub foreground: u8,
    /// Background gray level (255 = white)
    pub background: u8,
}

impl Default for QrCodeOptions {
    fn default() -> Self {
        Self {
            module_size: 4,
            error_correction: QrErrorCorrection::Medium,
            quiet_zone: 2,
            foreground: 0,
            background: 255,
        }
    }
}

impl QrCodeOptions {
    /// Create new QR code options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pixels per module.
    pub fn module_size(mut self, size: u32) -> Self {
        self.module_size = size.max(1);
        self
    }

    /// Set the error correction level.
    pub fn error_correction(mut self, level: QrErrorCorrection) -> Self {
        self.error_correction = level;
        self
    }

    /// Set the quiet zone (border) in modules.
    pub fn quiet_zone(mut self, modules: u32) -> Self {
        self.quiet_zone = modules;
        self
    }
}

/// A square matrix of QR modules, `true` meaning dark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Number of modules per side (without quiet zone).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the module at (`x`, `y`) is dark. Out-of-range modules are light.
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    /// Rasterise into a grayscale image, row 0 at the top.
    pub fn to_gray_image(&self, options: &QrCodeOptions) -> image::GrayImage {
        let module_size = options.module_size.max(1);
        let side_modules = self.width as u32 + options.quiet_zone * 2;
        let side = side_modules * module_size;

        let mut img = image::GrayImage::from_pixel(side, side, image::Luma([options.background]));
        let quiet_px = options.quiet_zone * module_size;
        for y in 0..self.width {
            for x in 0..self.width {
                if !self.is_dark(x, y) {
                    continue;
                }
                let start_x = quiet_px + x as u32 * module_size;
                let start_y = quiet_px + y as u32 * module_size;
                for dy in 0..module_size {
                    for dx in 0..module_size {
                        img.put_pixel(start_x + dx, start_y + dy, image::Luma([options.foreground]));
                    }
                }
            }
        }
        img
    }
}

/// QR code generator.
pub struct BarcodeGenerator;

impl BarcodeGenerator {
    /// Encode `data` into a QR module matrix.
    ///
    /// Encoding is deterministic: the same data and options always produce the
    /// same matrix.
    pub fn generate_qr(data: &str, options: &QrCodeOptions) -> Result<QrMatrix> {
        use qrcode::{EcLevel, QrCode};

        let ec_level = match options.error_correction {
            QrErrorCorrection::Low => EcLevel::L,
            QrErrorCorrection::Medium => EcLevel::M,
            QrErrorCorrection::Quartile => EcLevel::Q,
            QrErrorCorrection::High => EcLevel::H,
        };

        let code = QrCode::with_error_correction_level(data.as_bytes(), ec_level)
            .map_err(|e| Error::Appearance(format!("QR code encoding error: {}", e)))?;

        let modules = code
            .to_colors()
            .into_iter()
            .map(|module| module == qrcode::Color::Dark)
            .collect();

        Ok(QrMatrix {
            width: code.width(),
            modules,
        })
    }
}
