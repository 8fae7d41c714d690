//! CSV export of waveforms, measurements and analysis results.
//!
//! Every writer emits a header row followed by values in `{:.6e}`.

use std::io::Write;

use super::fft::FftResult;
use super::measure::WaveformMeasurements;
use super::monte_carlo::MonteCarloStats;
use super::sweep::SweepSample;
use crate::error::Result;
use crate::solver::BodePoint;

/// Write `time, channel...` rows.
///
/// Channels are aligned by sample index and the time column comes from the
/// first channel; output stops at the shortest channel.
pub fn write_waveforms_csv<W: Write>(out: &mut W, names: &[&str], channels: &[Vec<(f64, f64)>]) -> Result<()> {
    write!(out, "time")?;
    for name in names {
        write!(out, ",{name}")?;
    }
    writeln!(out)?;

    let rows = channels.iter().map(Vec::len).min().unwrap_or(0);
    for i in 0..rows {
        write!(out, "{:.6e}", channels[0][i].0)?;
        for channel in channels {
            write!(out, ",{:.6e}", channel[i].1)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write one summary row per channel.
pub fn write_measurements_csv<W: Write>(out: &mut W, rows: &[(&str, &WaveformMeasurements)]) -> Result<()> {
    writeln!(
        out,
        "channel,min,max,peak_to_peak,mean,rms,dc_offset,frequency,period,rise_time,fall_time,duty_cycle,pulse_width,phase"
    )?;
    for (name, m) in rows {
        write!(out, "{name}")?;
        for v in [
            m.min,
            m.max,
            m.peak_to_peak,
            m.mean,
            m.rms,
            m.dc_offset,
            m.frequency,
            m.period,
            m.rise_time,
            m.fall_time,
            m.duty_cycle,
            m.pulse_width,
            m.phase,
        ] {
            write!(out, ",{v:.6e}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write `quantity, value` rows of a DC operating point.
pub fn write_operating_point_csv<W: Write>(out: &mut W, rows: &[(String, f64)]) -> Result<()> {
    writeln!(out, "quantity,value")?;
    for (name, value) in rows {
        writeln!(out, "{name},{value:.6e}")?;
    }
    Ok(())
}

pub fn write_bode_csv<W: Write>(out: &mut W, points: &[BodePoint]) -> Result<()> {
    writeln!(out, "frequency,magnitude_db,phase_deg")?;
    for p in points {
        writeln!(out, "{:.6e},{:.6e},{:.6e}", p.frequency, p.magnitude_db, p.phase_deg)?;
    }
    Ok(())
}

pub fn write_spectrum_csv<W: Write>(out: &mut W, spectrum: &FftResult) -> Result<()> {
    writeln!(out, "frequency,magnitude_db,phase_deg")?;
    for k in 0..spectrum.bins() {
        writeln!(
            out,
            "{:.6e},{:.6e},{:.6e}",
            spectrum.frequencies[k], spectrum.magnitude_db[k], spectrum.phase_deg[k]
        )?;
    }
    Ok(())
}

pub fn write_sweep_csv<W: Write>(out: &mut W, samples: &[SweepSample]) -> Result<()> {
    writeln!(out, "value,min,max,mid,rms,valid")?;
    for s in samples {
        writeln!(
            out,
            "{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{}",
            s.value, s.min, s.max, s.mid, s.rms, s.valid
        )?;
    }
    Ok(())
}

pub fn write_monte_carlo_csv<W: Write>(out: &mut W, stats: &MonteCarloStats) -> Result<()> {
    writeln!(out, "mean,std_dev,min,max,p1,p99,valid_runs,failed_runs")?;
    writeln!(
        out,
        "{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{},{}",
        stats.mean, stats.std_dev, stats.min, stats.max, stats.p1, stats.p99, stats.valid_runs, stats.failed_runs
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_csv() {
        let a = vec![(0.0, 1.0), (1e-3, 2.0), (2e-3, 3.0)];
        let b = vec![(0.0, -1.0), (1e-3, -2.0)];
        let mut out = Vec::new();
        write_waveforms_csv(&mut out, &["in", "out"], &[a, b]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,in,out");
        assert_eq!(lines[2], "1.000000e-3,2.000000e0,-2.000000e0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_measurement_csv_header() {
        let m = WaveformMeasurements::default();
        let mut out = Vec::new();
        write_measurements_csv(&mut out, &[("out", &m)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("channel,min,max,peak_to_peak"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("out,0.000000e0,"));
        assert_eq!(row.split(',').count(), 14);
    }

    #[test]
    fn test_operating_point_csv() {
        let rows = vec![("V(out)".to_string(), 5.0), ("I(V1)".to_string(), -0.005)];
        let mut out = Vec::new();
        write_operating_point_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "quantity,value\nV(out),5.000000e0\nI(V1),-5.000000e-3\n");
    }

    #[test]
    fn test_bode_csv() {
        let points = [BodePoint {
            frequency: 1000.0,
            magnitude_db: -3.0,
            phase_deg: -45.0,
        }];
        let mut out = Vec::new();
        write_bode_csv(&mut out, &points).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "frequency,magnitude_db,phase_deg\n1.000000e3,-3.000000e0,-4.500000e1\n");
    }
}
