use dlnademux::structs::time::Time;

pub fn time_str(sec: f64) -> String {
    let sign = if sec < 0.0 { "-" } else { "" };
    let ms = sec.abs() * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{sign}{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

pub fn time_opt_str(time: Option<Time>) -> String {
    time.map_or_else(|| "unknown".to_string(), |t| time_str(t.as_secs_f64()))
}

#[test]
fn formats_clock_time() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(3723.25), "01:02:03.250");
    assert_eq!(time_str(-1.5), "-00:00:01.500");
    assert_eq!(time_opt_str(None), "unknown");
}
