//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediamill::ConversionService;
use mm_av::{Compressor, Converter, ToolRegistry};
use mm_core::config::{CompressionConfig, ToolsConfig};
use mm_queue::TaskQueue;

/// Write a `size`x`size` RGB PNG filled with pseudo-random noise, which
/// compresses poorly and so gives the quality search something to do.
pub fn noisy_png(dir: &Path, name: &str, size: u32) -> PathBuf {
    let mut seed: u32 = 0x9e37_79b9;
    let img = image::RgbImage::from_fn(size, size, |_, _| {
        let mut px = [0u8; 3];
        for c in &mut px {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            *c = (seed >> 24) as u8;
        }
        image::Rgb(px)
    });
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Install an executable shell script named `name` in `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A service over `tools` that never touches ImageMagick, so image work
/// goes through the in-process encoder.
pub fn service_with(tools: ToolRegistry, concurrency: usize) -> ConversionService {
    let tools = Arc::new(tools);
    let converter =
        Converter::new(tools.clone(), &ToolsConfig::default()).with_image_candidates(Vec::new());
    let compressor = Compressor::new(tools, Vec::new(), CompressionConfig::default());
    ConversionService::new(TaskQueue::new(concurrency).unwrap(), converter, compressor)
}

pub fn service(concurrency: usize) -> ConversionService {
    service_with(ToolRegistry::empty(), concurrency)
}
