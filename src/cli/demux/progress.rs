use anyhow::Result;
use dlnademux::structs::time::Time;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::timestamp::time_str;

/// Progress in milliseconds of media time when the duration is known,
/// a buffer counter otherwise.
pub fn create_progress_bar(multi: &MultiProgress, duration: Option<Time>) -> Result<ProgressBar> {
    let pb = match duration.filter(|d| *d > Time::ZERO) {
        Some(duration) => {
            let pb = multi.add(ProgressBar::new(duration.as_millis() as u64));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {percent}%\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
            )?);
            pb
        }
        None => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {pos} buffers\n{msg} | elapsed: {elapsed_precise}",
            )?);
            pb
        }
    };

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("probing streams");
    Ok(pb)
}

pub fn update_progress(pb: &ProgressBar, position: Option<Time>, buffers: u64, elapsed: f64) {
    let Some(position) = position else {
        pb.set_position(buffers);
        return;
    };

    if pb.length().is_some() {
        pb.set_position(position.as_millis().max(0) as u64);
    } else {
        pb.set_position(buffers);
    }

    let speed = if elapsed > 0.0 {
        position.as_secs_f64() / elapsed
    } else {
        0.0
    };
    pb.set_message(format!(
        "speed: {speed:.1}x | timestamp: {}",
        time_str(position.as_secs_f64())
    ));
}

pub fn finalize_progress_bar(pb: &Option<ProgressBar>, position: Option<Time>, elapsed: f64) {
    if let Some(pb) = pb {
        let position = position.unwrap_or_default().as_secs_f64();
        let speed = if elapsed > 0.0 { position / elapsed } else { 0.0 };

        pb.finish_with_message(format!(
            "speed: {speed:.1}x | timestamp: {}",
            time_str(position)
        ));
    }
}
