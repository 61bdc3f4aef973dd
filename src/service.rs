//! Conversion service: the queue, converter and compressor wired together.
//!
//! Every conversion and compression runs as a task on a shared
//! [`TaskQueue`], so no more than the configured number of external tool
//! pipelines are active at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use mm_av::{
    CompressionKind, CompressionOutcome, ConversionOptions, Compressor, Converter, ToolRegistry,
};
use mm_core::config::Config;
use mm_core::Result;
use mm_queue::{QueueStats, TaskHandle, TaskQueue};

/// A single file conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub target_format: String,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, target_format: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            target_format: target_format.into(),
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Result of a finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// The converted file.
    pub output: PathBuf,
    /// Present when a target size was requested and the output format can
    /// be compressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionOutcome>,
}

/// One input's outcome within a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub input: PathBuf,
    pub outcome: Result<ConversionResult>,
}

/// Queue-backed front door for conversions and compressions.
#[derive(Debug, Clone)]
pub struct ConversionService {
    queue: TaskQueue,
    converter: Arc<Converter>,
    compressor: Arc<Compressor>,
}

impl ConversionService {
    pub fn new(queue: TaskQueue, converter: Converter, compressor: Compressor) -> Self {
        Self {
            queue,
            converter: Arc::new(converter),
            compressor: Arc::new(compressor),
        }
    }

    /// Discover tools and build every component from `config`.
    ///
    /// # Errors
    ///
    /// [`mm_core::Error::InvalidConfiguration`] if the queue settings are
    /// unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let queue = TaskQueue::from_config(&config.queue)?;
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let converter = Converter::new(tools.clone(), &config.tools);
        let compressor = Compressor::new(
            tools,
            converter.image_candidates().to_vec(),
            config.compression.clone(),
        );

        info!(
            concurrency = queue.capacity(),
            max_pending = ?config.queue.max_pending,
            "Conversion service ready"
        );
        Ok(Self::new(queue, converter, compressor))
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    /// Enqueue a conversion, followed by a compression pass when the
    /// request carries a target file size.
    pub fn submit_conversion(
        &self,
        request: ConversionRequest,
    ) -> Result<TaskHandle<ConversionResult>> {
        let converter = self.converter.clone();
        let compressor = self.compressor.clone();
        self.queue
            .enqueue(move || run_conversion(converter, compressor, request))
    }

    /// Enqueue an in-place compression of `path` toward `target` bytes.
    pub fn submit_compression(
        &self,
        path: impl Into<PathBuf>,
        target: u64,
        kind: CompressionKind,
    ) -> Result<TaskHandle<CompressionOutcome>> {
        let path = path.into();
        let compressor = self.compressor.clone();
        self.queue.enqueue(move || async move {
            compressor.compress_to_target_size(&path, target, kind).await
        })
    }

    /// Convert every input to `target_format`, returning one entry per input
    /// in input order. A failure only affects its own entry.
    pub async fn convert_batch(
        &self,
        inputs: Vec<PathBuf>,
        target_format: &str,
        options: &ConversionOptions,
    ) -> Vec<BatchEntry> {
        let submitted: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let request = ConversionRequest::new(input.clone(), target_format)
                    .with_options(options.clone());
                (input, self.submit_conversion(request))
            })
            .collect();

        let mut entries = Vec::with_capacity(submitted.len());
        for (input, handle) in submitted {
            let outcome = match handle {
                Ok(handle) => handle.await,
                Err(e) => Err(e),
            };
            if let Err(ref e) = outcome {
                warn!(input = %input.display(), error = %e, "Batch entry failed");
            }
            entries.push(BatchEntry { input, outcome });
        }

        let failed = entries.iter().filter(|e| e.outcome.is_err()).count();
        info!(
            total = entries.len(),
            failed,
            format = target_format,
            "Batch finished"
        );
        entries
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

async fn run_conversion(
    converter: Arc<Converter>,
    compressor: Arc<Compressor>,
    request: ConversionRequest,
) -> Result<ConversionResult> {
    let ConversionRequest {
        input,
        target_format,
        options,
    } = request;

    let output = converter
        .convert_file(&input, &target_format, &options)
        .await?;

    let compression = match options.target_file_size {
        Some(target) => compress_output(&compressor, &output, target).await,
        None => None,
    };

    Ok(ConversionResult {
        output,
        compression,
    })
}

/// Compress a freshly converted file when its format supports it.
///
/// A compression error never fails the conversion; the uncompressed output
/// is returned instead.
async fn compress_output(
    compressor: &Compressor,
    output: &Path,
    target: u64,
) -> Option<CompressionOutcome> {
    let Some(kind) = CompressionKind::from_path(output) else {
        info!(
            output = %output.display(),
            target,
            "Output format has no size-targeted compression; leaving as is"
        );
        return None;
    };
    match compressor.compress_to_target_size(output, target, kind).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(
                output = %output.display(),
                error = %e,
                "Compression failed; keeping uncompressed output"
            );
            None
        }
    }
}
