use anyhow::{Context, Result};
use karavox_cdg::{CdgDecoder, FRAME_HEIGHT, FRAME_WIDTH};

/// Decodes `cdg_path` and writes the frame current at `at_ms` to `out_path`
/// as raw rgb24 (288x192, 3 bytes per pixel).
///
/// With `at_ms` unset the frame at the end of the stream is written.
pub fn run(cdg_path: &str, out_path: &str, at_ms: Option<u32>) -> Result<()> {
    let data = std::fs::read(cdg_path)
        .with_context(|| format!("failed to read CDG file '{cdg_path}'"))?;

    let mut decoder = CdgDecoder::new();
    decoder.open(data)?;
    decoder.process()?;

    let duration = decoder.duration_ms();
    log::info!(
        "decoded '{}': {} frames, {} ms",
        cdg_path,
        decoder.frames().len(),
        duration
    );

    let ms = at_ms.unwrap_or(duration);
    let frame = decoder
        .frame_at(ms)
        .context("stream too short to produce any frame")?;
    std::fs::write(out_path, frame.to_rgb24())
        .with_context(|| format!("failed to write '{out_path}'"))?;

    println!(
        "Wrote {}x{} rgb24 frame at {} ms (stream duration {} ms) to '{}'",
        FRAME_WIDTH,
        FRAME_HEIGHT,
        frame.start_time_ms(),
        duration,
        out_path
    );
    Ok(())
}
