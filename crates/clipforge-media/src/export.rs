//! Export orchestration.
//!
//! Sequences one export end to end: validate, stage inputs, build the
//! argument list, run the engine, read the artifact back, release staged
//! files. The engine handle is held for the whole job, so overlapping export
//! requests serialize behind it, and every staged file carries a per-job
//! namespace so a second job can never touch the first job's files.

use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use clipforge_models::export::DEFAULT_AUDIO_BITRATE;
use clipforge_models::{Dimensions, ExportFormat, ExportJob};

use crate::command::{FfmpegCommand, InputSpec};
use crate::dual::DualVideoSync;
use crate::engine::{EngineHandle, TranscodeEngine};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    audio_mix_chains, base_video_chain, dual_audio_inputs, dual_stack_chains,
    overlay_composite_chain, resolve_bitrate_kbps, AudioMixInput,
};
use crate::overlay::{render_overlay_frames_async, OverlayRenderSpec, RasterConfig};
use crate::progress::{ExportPhase, ExportProgress, FfmpegProgress};

/// Progress sink for one export. Notification only, no backpressure.
pub type ProgressSender = mpsc::UnboundedSender<ExportProgress>;

/// Validated copy of the job fields the pipeline needs up front.
struct JobContext {
    target: Dimensions,
    display: Dimensions,
    namespace: String,
}

fn validate_job(job: &ExportJob) -> MediaResult<JobContext> {
    let target = job
        .target_resolution
        .ok_or_else(|| MediaError::missing_config("target resolution"))?;
    let display = job
        .display_size
        .ok_or_else(|| MediaError::missing_config("client display size"))?;
    if job.trim.duration_ms() == 0 {
        return Err(MediaError::InvalidVideo("Empty trim window".to_string()));
    }

    Ok(JobContext {
        target,
        display,
        namespace: format!("job-{}", Uuid::new_v4().simple().to_string()[..8].to_owned()),
    })
}

fn emit(progress: &Option<ProgressSender>, phase: ExportPhase, percent: f32) {
    if let Some(tx) = progress {
        let _ = tx.send(ExportProgress::new(phase, percent));
    }
}

fn file_ext(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("mp4")
}

/// Run a full export and return the produced artifact bytes.
///
/// Long-running and not cancellable once the transcode starts; discarding
/// the future before then abandons the job (staged files are reclaimed by
/// the next engine teardown).
pub async fn export_clip(
    handle: &EngineHandle,
    source: Vec<u8>,
    job: &ExportJob,
    progress: Option<ProgressSender>,
) -> MediaResult<Vec<u8>> {
    // Fail fast before any engine work.
    let ctx = validate_job(job)?;

    let started = Instant::now();
    emit(&progress, ExportPhase::Preparing, 0.0);

    // Exclusive use of the process-wide engine for the whole job.
    let engine = handle.lock().await;
    engine.load().await?;

    let mut staged: Vec<String> = Vec::new();
    let result = run_export(engine.as_ref(), source, job, &ctx, &progress, &mut staged).await;

    // Success or failure, staged inputs/outputs never outlive the job.
    cleanup_staged(engine.as_ref(), &staged).await;

    match &result {
        Ok(bytes) => {
            counter!("export_jobs_total", "outcome" => "success").increment(1);
            histogram!("export_duration_seconds").record(started.elapsed().as_secs_f64());
            info!(
                clip_id = %job.clip.clip_id,
                size = bytes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Export complete"
            );
            emit(&progress, ExportPhase::Finalizing, 100.0);
        }
        Err(e) => {
            counter!("export_jobs_total", "outcome" => "failure").increment(1);
            warn!(clip_id = %job.clip.clip_id, error = %e, "Export failed");
        }
    }

    result
}

async fn run_export(
    engine: &dyn TranscodeEngine,
    source: Vec<u8>,
    job: &ExportJob,
    ctx: &JobContext,
    progress: &Option<ProgressSender>,
    staged: &mut Vec<String>,
) -> MediaResult<Vec<u8>> {
    let settings = &job.settings;
    let ns = &ctx.namespace;

    // Stage the source clip.
    let source_ext = job
        .clip
        .original_filename
        .as_deref()
        .map(file_ext)
        .unwrap_or("mp4");
    let input_name = format!("{ns}-input.{source_ext}");
    engine.write_input(&input_name, &source).await?;
    staged.push(input_name.clone());
    emit(progress, ExportPhase::Preparing, 5.0);

    let start_secs = job.trim.start_secs();
    let duration_secs = job.trim.duration_secs();

    let output_name = format!("{ns}-output.{}", settings.format.extension());
    let mut cmd = FfmpegCommand::new(&input_name, &output_name).primary_input(
        InputSpec::new(&input_name)
            .seek(start_secs)
            .duration(duration_secs),
    );

    let mut chains = vec![base_video_chain(job.source_dimensions, settings, ctx.target)];
    let mut video_label = "base".to_string();

    // Overlays: rasterize the deduplicated frame sequence, then stage one
    // image per output frame (bytes reused per distinct state).
    if job.has_overlays() {
        emit(progress, ExportPhase::RenderingOverlays, 10.0);
        let spec = OverlayRenderSpec {
            trim: job.trim,
            fps: settings.fps,
            target: ctx.target,
            display: ctx.display,
            use_dual_placement: job.dual.as_ref().is_some_and(|d| d.visible),
        };
        let rendered = render_overlay_frames_async(
            job.text_overlays.clone(),
            job.image_overlays.clone(),
            spec,
            RasterConfig::default(),
        )
        .await?;

        emit(progress, ExportPhase::Staging, 25.0);
        for frame in 0..rendered.total_frames() {
            let name = format!("{ns}-overlay-{frame:05}.png");
            engine.write_input(&name, rendered.frame_png(frame)).await?;
            staged.push(name);
        }

        let pattern = format!("{ns}-overlay-%05d.png");
        let overlay_idx = cmd.push_input(InputSpec::new(pattern).framerate(settings.fps));
        chains.push(overlay_composite_chain(
            &video_label,
            overlay_idx,
            duration_secs,
            "vover",
        ));
        video_label = "vover".to_string();
    }

    // Dual video: same offset the preview used, applied as an input seek
    // (secondary already running) or a lead-in pad (secondary starts later).
    let mut audio_inputs: Vec<AudioMixInput> = vec![AudioMixInput {
        input: 0,
        volume: 1.0,
        delay_ms: 0,
        trim_secs: None,
    }];
    let mut has_filter_audio = false;

    if let Some(dual) = job.dual.as_ref().filter(|d| d.visible) {
        emit(progress, ExportPhase::Staging, 30.0);
        let dual_name = format!("{ns}-dual.{}", file_ext(&dual.filename));
        engine.write_input(&dual_name, &dual.data).await?;
        staged.push(dual_name.clone());

        // The same committed offset the preview synchronizer reads.
        let offset_ms = DualVideoSync::from(dual).export_offset_ms();
        let seek_ms = job.trim.start_ms.saturating_sub(offset_ms);
        let lead_in_ms = offset_ms.saturating_sub(job.trim.start_ms);

        let dual_idx = cmd.push_input(
            InputSpec::new(&dual_name)
                .seek(seek_ms as f64 / 1000.0)
                .duration(duration_secs),
        );
        chains.push(dual_stack_chains(
            &video_label,
            dual_idx,
            job.dual_layout,
            ctx.target,
            lead_in_ms as f64 / 1000.0,
            "vdual",
        ));
        video_label = "vdual".to_string();

        audio_inputs = dual_audio_inputs(job.dual_audio, dual_idx, dual.volume, lead_in_ms);
        has_filter_audio = true;
    }

    // Extra audio tracks join the mix with their window applied.
    for (i, track) in job.active_audio_tracks().enumerate() {
        let name = format!("{ns}-audio-{i}.{}", file_ext(&track.filename));
        engine.write_input(&name, &track.data).await?;
        staged.push(name.clone());

        let track_idx = cmd.push_input(InputSpec::new(&name));
        audio_inputs.push(AudioMixInput {
            input: track_idx,
            volume: track.volume,
            delay_ms: track.start_ms,
            trim_secs: Some((track.end_ms.saturating_sub(track.start_ms)) as f64 / 1000.0),
        });
        has_filter_audio = true;
    }

    if has_filter_audio {
        if let Some(audio_chain) = audio_mix_chains(&audio_inputs) {
            chains.push(audio_chain);
        }
    }

    cmd = cmd
        .filter_complex(chains.join(";"))
        .map(format!("[{video_label}]"));
    cmd = if has_filter_audio {
        cmd.map("[aout]")
    } else {
        cmd.map("0:a?")
    };

    cmd = cmd
        .video_codec(settings.format.video_codec())
        .preset(&settings.preset)
        .crf(settings.crf)
        .fps(settings.fps)
        .video_bitrate_kbps(resolve_bitrate_kbps(settings))
        .audio_codec(settings.format.audio_codec())
        .audio_bitrate(DEFAULT_AUDIO_BITRATE);
    if matches!(settings.format, ExportFormat::Mp4 | ExportFormat::Mov) {
        cmd = cmd.faststart();
    }

    staged.push(output_name.clone());

    // Map raw engine progress into the transcoding band of the overall bar.
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<FfmpegProgress>();
    let forward_progress = progress.clone();
    let total_ms = job.trim.duration_ms() as i64;
    let forwarder = tokio::spawn(async move {
        while let Some(p) = raw_rx.recv().await {
            if let Some(tx) = &forward_progress {
                let percent = 40.0 + p.percentage(total_ms) as f32 * 0.55;
                let _ = tx.send(ExportProgress::new(ExportPhase::Transcoding, percent));
            }
        }
    });

    emit(progress, ExportPhase::Transcoding, 40.0);
    let exec_result = engine.exec(&cmd.build_args(), Some(raw_tx)).await;
    let _ = forwarder.await;
    exec_result?;

    emit(progress, ExportPhase::Finalizing, 96.0);
    engine.read_output(&output_name).await
}

/// Best-effort release of staged files. Failures are logged and swallowed so
/// the original export error (if any) stays primary.
async fn cleanup_staged(engine: &dyn TranscodeEngine, staged: &[String]) {
    for name in staged {
        if let Err(e) = engine.delete_file(name).await {
            warn!(name = %name, error = %e, "Failed to clean up staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{
        ClipMetadata, DualAudioSource, DualLayout, ExportSettings, TrimWindow,
    };

    fn minimal_job() -> ExportJob {
        ExportJob {
            clip: ClipMetadata {
                clip_id: "clip-1".into(),
                duration_ms: 10_000,
                start_time_ms: 0,
                end_time_ms: 10_000,
                streamer_name: None,
                original_filename: None,
                storage_key: "clips/clip-1.mp4".into(),
            },
            trim: TrimWindow::new(0, 10_000),
            text_overlays: Vec::new(),
            image_overlays: Vec::new(),
            audio_tracks: Vec::new(),
            settings: ExportSettings::default(),
            display_size: Some(Dimensions::new(960, 540)),
            target_resolution: Some(Dimensions::new(1920, 1080)),
            source_dimensions: Dimensions::new(1920, 1080),
            dual: None,
            dual_layout: DualLayout::Vertical,
            dual_audio: DualAudioSource::Primary,
        }
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("clip.webm"), "webm");
        assert_eq!(file_ext("archive.tar.gz"), "gz");
        assert_eq!(file_ext("noext"), "mp4");
    }

    #[test]
    fn test_namespace_is_unique_per_job() {
        let job = minimal_job();
        let a = validate_job(&job).unwrap().namespace;
        let b = validate_job(&job).unwrap().namespace;
        assert_ne!(a, b);
        assert!(a.starts_with("job-"));
    }

    #[test]
    fn test_validation_fails_without_target_resolution() {
        let mut job = minimal_job();
        job.target_resolution = None;
        assert!(matches!(
            validate_job(&job),
            Err(MediaError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_validation_fails_without_display_size() {
        let mut job = minimal_job();
        job.display_size = None;
        assert!(matches!(
            validate_job(&job),
            Err(MediaError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_validation_fails_on_empty_trim() {
        let mut job = minimal_job();
        job.trim = TrimWindow::new(5_000, 5_000);
        assert!(matches!(validate_job(&job), Err(MediaError::InvalidVideo(_))));
    }
}
