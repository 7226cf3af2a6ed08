// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for barcode decoding
//!
//! This module provides command-line functionality for:
//! - Decoding image files
//! - Printing the parameter template
//! - Streaming images through continuous frame decoding

use barcode_bridge::constants::file_formats;
use barcode_bridge::{
    BarcodeReader, FrameAdmission, FrameDecodingParameters, FrameEvent, ImageSource, PixelFormat,
    RuntimeSettings, SymbolResult,
};
use futures::channel::mpsc;
use image::GrayImage;
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Decode every given file (directories are searched for images)
pub fn decode_files(
    files: &[PathBuf],
    parameters: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = BarcodeReader::default();
    if let Some(path) = parameters {
        let text = std::fs::read_to_string(&path)?;
        reader.set_parameters(&text)?;
    }

    let paths = collect_image_paths(files)?;
    if paths.is_empty() {
        return Err("No image files given".into());
    }

    let mut failures = 0usize;
    let mut report = Vec::with_capacity(paths.len());

    for path in &paths {
        match reader.decode_timed(&ImageSource::File(path.clone())) {
            Ok(decoded) => {
                let elapsed_ms = decoded.elapsed.as_millis() as u64;
                let results = decoded.results;
                if json {
                    report.push(serde_json::json!({
                        "file": path.display().to_string(),
                        "elapsedMs": elapsed_ms,
                        "results": results,
                    }));
                } else {
                    print_results(path, &results, elapsed_ms);
                }
            }
            Err(e) => {
                failures += 1;
                if json {
                    report.push(serde_json::json!({
                        "file": path.display().to_string(),
                        "error": { "code": e.code(), "message": e.to_string() },
                    }));
                } else {
                    eprintln!("{}: {}", path.display(), e);
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if failures == paths.len() {
        return Err(format!("Failed to decode all {} file(s)", failures).into());
    }
    Ok(())
}

fn print_results(path: &Path, results: &[SymbolResult], elapsed_ms: u64) {
    println!("{} ({} ms)", path.display(), elapsed_ms);
    if results.is_empty() {
        println!("  No barcode found");
    }
    for (index, result) in results.iter().enumerate() {
        let corners: Vec<String> = result
            .location
            .points
            .iter()
            .map(|p| format!("({}, {})", p.x, p.y))
            .collect();
        println!("  [{}] {}: {}", index, result.format, result.text);
        println!("      Location: {}", corners.join(" "));
    }
}

/// Print or write the default parameter template
pub fn print_parameters(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let template = RuntimeSettings::default().to_json()?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&path, template)?;
            println!("Parameters written: {}", path.display());
        }
        None => println!("{}", template),
    }
    Ok(())
}

/// Feed images as grayscale frames through continuous decoding
pub fn stream_files(
    files: &[PathBuf],
    fps: u32,
    repeat: u32,
    queue: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = collect_image_paths(files)?;
    let frames = load_frames(&paths)?;
    let Some(first) = frames.first() else {
        return Err("No image files given".into());
    };
    let (width, height) = first.dimensions();

    println!("Streaming {} image(s) as {}x{} frames", frames.len(), width, height);
    println!("Press Ctrl+C to stop early");
    println!();

    let reader = BarcodeReader::default();
    let params = FrameDecodingParameters {
        max_queue_length: queue,
        ..FrameDecodingParameters::new(width, height, width, PixelFormat::Grayscale)
    };
    let (sender, mut receiver) = mpsc::unbounded::<FrameEvent>();
    reader.start_frame_decoding(params, sender)?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

    'feed: for _ in 0..repeat.max(1) {
        for frame in &frames {
            if stop_flag.load(Ordering::SeqCst) {
                println!("Stopping early...");
                break 'feed;
            }

            if let FrameAdmission::Dropped { frame_id } = reader.append_frame(frame.as_raw())? {
                println!("frame {:>5}: dropped (queue full)", frame_id);
            }
            while let Ok(event) = receiver.try_recv() {
                print_event(&event);
            }
            std::thread::sleep(interval);
        }
    }

    // Let the decoding thread drain what is queued
    let deadline = Instant::now() + Duration::from_secs(2);
    while reader.frame_queue_length() > 0
        && Instant::now() < deadline
        && !stop_flag.load(Ordering::SeqCst)
    {
        std::thread::sleep(Duration::from_millis(20));
    }
    reader.stop_frame_decoding()?;

    while let Ok(event) = receiver.try_recv() {
        print_event(&event);
    }

    let stats = reader.frame_statistics();
    println!();
    println!(
        "Frames: {} appended, {} decoded, {} failed, {} dropped, {} discarded",
        stats.appended, stats.decoded, stats.failed, stats.dropped, stats.discarded
    );

    Ok(())
}

fn print_event(event: &FrameEvent) {
    match event {
        FrameEvent::Results(frame) if frame.results.is_empty() => {
            println!(
                "frame {:>5}: no barcode ({} ms)",
                frame.frame_id,
                frame.elapsed.as_millis()
            );
        }
        FrameEvent::Results(frame) => {
            for result in &frame.results {
                println!(
                    "frame {:>5}: {} ({} ms)",
                    frame.frame_id,
                    result,
                    frame.elapsed.as_millis()
                );
            }
        }
        FrameEvent::Error { frame_id, error } => {
            println!("frame {:>5}: error {}", frame_id, error);
        }
    }
}

/// Load images as grayscale, resized to the first image's dimensions
fn load_frames(paths: &[PathBuf]) -> Result<Vec<GrayImage>, Box<dyn std::error::Error>> {
    let mut frames: Vec<GrayImage> = Vec::with_capacity(paths.len());
    for path in paths {
        let gray = image::open(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?
            .to_luma8();
        let gray = match frames.first() {
            Some(first) if first.dimensions() != gray.dimensions() => {
                let (width, height) = first.dimensions();
                imageops::resize(&gray, width, height, FilterType::Triangle)
            }
            _ => gray,
        };
        frames.push(gray);
    }
    Ok(frames)
}

/// Collect image paths from input (files or directories)
///
/// Files named explicitly are always kept; directories contribute the
/// images they contain.
fn collect_image_paths(input: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();

    for path in input {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let file_path = entry.path();
                if is_supported_image(&file_path) {
                    found.push(file_path);
                }
            }
            // Sort by filename for consistent ordering
            found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
            paths.extend(found);
        } else {
            paths.push(path.clone());
        }
    }

    Ok(paths)
}

/// Check if a path is a supported image file
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| file_formats::is_image_extension(&ext.to_string_lossy()))
        .unwrap_or(false)
}
