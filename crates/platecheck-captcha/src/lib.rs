//! Platecheck CAPTCHA - image CAPTCHA solving with layered OCR.
//!
//! This crate downloads a CAPTCHA image through a caller-provided source,
//! cleans it up for recognition and runs it through an ordered list of OCR
//! engines until one produces an answer.
//!
//! # Features
//!
//! - **Engine Abstraction**: Unified trait for local and cloud OCR backends
//! - **Local-First**: Tesseract runs first; the cloud API is only a fallback
//! - **Preprocessing**: Grayscale conversion and a fixed contrast boost
//!
//! # Example
//!
//! ```rust,ignore
//! use platecheck_captcha::{CaptchaSolver, OcrChainSolver};
//!
//! let solver = OcrChainSolver::from_config(&config.ocr)?;
//! let answer = solver.solve(&session).await?;
//! println!("Answer: {answer}");
//! ```
//!
//! # Engine order
//!
//! ```text
//! image bytes → decode → grayscale → contrast +20%
//!                                         ↓
//!          Tesseract (single line, [0-9a-zA-Z]) ──fail──→ OCR.space API
//!                  ↓ ok                                        ↓ ok
//!               answer                                      answer
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod engine;
pub mod engines;
pub mod error;
pub mod preprocess;
pub mod solver;

// Re-export commonly used types
pub use engine::{CaptchaImageSource, OcrEngine};
pub use engines::{OcrSpaceEngine, TesseractEngine};
pub use error::{CaptchaError, Result};
pub use preprocess::Preprocessor;
pub use solver::{CaptchaSolver, OcrChainSolver};
