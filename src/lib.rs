//! Canvas node backend: an image/mask cache that lives across pipeline
//! runs, the canvas files the browser editor saves, and a background
//! removal (matting) service with live status reporting.

pub mod canvas;
pub mod error;
pub mod imaging;
pub mod matting;
pub mod web;
