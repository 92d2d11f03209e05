//! OCR engine implementations.

pub mod ocr_space;
pub mod tesseract;

pub use ocr_space::OcrSpaceEngine;
pub use tesseract::TesseractEngine;
