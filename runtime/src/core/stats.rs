use serde::Deserialize;
use tracing::debug;

const MIB: f64 = 1_048_576.0;

/// One normalized resource snapshot for a container.
///
/// Produced by [`StatsSample::parse`] from the engine CLI's human-readable
/// stats output. Parsing is total: malformed input yields zero-valued fields,
/// never an error, so a flaky engine cannot fail a sampling loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSample {
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

/// The `--format` template the driver passes to the engine CLI. Keys match
/// [`RawStats`].
pub const STATS_FORMAT: &str = r#"{"cpu":"{{.CPUPerc}}","mem":"{{.MemUsage}}","net":"{{.NetIO}}"}"#;

#[derive(Debug, Deserialize)]
struct RawStats {
    cpu: String,
    mem: String,
    net: String,
}

impl StatsSample {
    /// Parses one engine CLI stats snapshot.
    ///
    /// The CLI sometimes emits terminal escape codes and extra lines even
    /// with `--no-stream`, so this takes the last non-empty line, strips
    /// escapes, and extracts the JSON object before field parsing.
    pub fn parse(output: &str) -> StatsSample {
        let Some(line) = output.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
            return StatsSample::default();
        };

        let clean = strip_ansi(line);
        let json = match (clean.find('{'), clean.rfind('}')) {
            (Some(start), Some(end)) if start < end => &clean[start..=end],
            _ => {
                debug!("stats snapshot carried no JSON object: {clean:?}");
                return StatsSample::default();
            }
        };

        let raw: RawStats = match serde_json::from_str(json) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("unparseable stats snapshot {json:?}: {e}");
                return StatsSample::default();
            }
        };

        let cpu_percent = parse_percent(&raw.cpu);

        let (memory_usage_mb, memory_limit_mb) = match raw.mem.split_once(" / ") {
            Some((usage, limit)) => (parse_memory_mib(usage), parse_memory_mib(limit)),
            None => (parse_memory_mib(&raw.mem), 0.0),
        };
        let memory_percent = if memory_limit_mb > 0.0 {
            (memory_usage_mb / memory_limit_mb) * 100.0
        } else {
            0.0
        };

        let (network_rx_bytes, network_tx_bytes) = match raw.net.split_once(" / ") {
            Some((rx, tx)) => (parse_size_bytes(rx), parse_size_bytes(tx)),
            None => (0, 0),
        };

        StatsSample {
            cpu_percent,
            memory_usage_mb,
            memory_limit_mb,
            memory_percent,
            network_rx_bytes,
            network_tx_bytes,
        }
    }
}

/// Parses `"12.34%"` to `12.34`. Anything unparseable is `0.0`.
pub fn parse_percent(s: &str) -> f64 {
    s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0)
}

/// Parses a memory quantity like `"45.09MiB"` or `"1.2GiB"` into MiB.
///
/// Decimal suffixes (`MB`, `GB`, ...) are treated as their binary
/// counterparts, matching the engine CLI's loose unit labelling.
pub fn parse_memory_mib(s: &str) -> f64 {
    match split_unit(s) {
        Some((value, unit)) => match unit {
            "GiB" | "GB" => value * 1024.0,
            "MiB" | "MB" => value,
            "KiB" | "kB" | "KB" | "kiB" => value / 1024.0,
            "B" => value / MIB,
            _ => 0.0,
        },
        None => 0.0,
    }
}

/// Parses a network quantity like `"1.2MB"` or `"500kB"` into bytes.
pub fn parse_size_bytes(s: &str) -> u64 {
    let value = match split_unit(s) {
        Some((value, unit)) => match unit {
            "GiB" | "GB" => value * 1024.0 * MIB,
            "MiB" | "MB" => value * MIB,
            "KiB" | "kB" | "KB" | "kiB" => value * 1024.0,
            "B" => value,
            _ => 0.0,
        },
        None => 0.0,
    };
    if value.is_finite() && value >= 0.0 {
        value as u64
    } else {
        0
    }
}

/// Splits `"45.09MiB"` into `(45.09, "MiB")`.
fn split_unit(s: &str) -> Option<(f64, &str)> {
    let s = s.trim();
    let unit_start = s.find(|c: char| c.is_ascii_alphabetic())?;
    let value = s[..unit_start].trim().parse::<f64>().ok()?;
    Some((value, s[unit_start..].trim()))
}

/// Removes ANSI escape sequences the engine CLI leaves in captured output.
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        // CSI sequences run until a final byte in `@`..=`~`; bare escapes
        // consume one following character.
        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_parse_full_snapshot() {
        let out = r#"{"cpu":"0.05%","mem":"45.09MiB / 512MiB","net":"1.2MB / 500kB"}"#;
        let sample = StatsSample::parse(out);

        assert!((sample.cpu_percent - 0.05).abs() < 1e-9);
        assert!((sample.memory_usage_mb - 45.09).abs() < 1e-9);
        assert!((sample.memory_limit_mb - 512.0).abs() < 1e-9);
        assert!((sample.memory_percent - 45.09 / 512.0 * 100.0).abs() < 1e-9);
        assert_eq!(sample.network_rx_bytes, (1.2 * 1_048_576.0) as u64);
        assert_eq!(sample.network_tx_bytes, 500 * 1024);
    }

    #[test]
    fn test_parse_tolerates_header_lines_and_ansi() {
        let out = format!(
            "CONTAINER  CPU %  MEM USAGE\n\u{1b}[2J\u{1b}[H{}\n",
            r#"{"cpu":"12.00%","mem":"1.5GiB / 2GiB","net":"0B / 0B"}"#
        );
        let sample = StatsSample::parse(&out);

        assert!((sample.cpu_percent - 12.0).abs() < 1e-9);
        assert!((sample.memory_usage_mb - 1536.0).abs() < 1e-9);
        assert!((sample.memory_limit_mb - 2048.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_failures_yield_zeroes() {
        for garbage in ["", "not json", "{\"cpu\":12}", "{}", "CONTAINER\n\n"] {
            assert_eq!(StatsSample::parse(garbage), StatsSample::default());
        }
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("0.05%"), 0.05);
        assert_eq!(parse_percent(" 100% "), 100.0);
        assert_eq!(parse_percent("n/a"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
    }

    #[test]
    fn test_memory_units() {
        assert_eq!(parse_memory_mib("512MiB"), 512.0);
        assert_eq!(parse_memory_mib("2GiB"), 2048.0);
        assert_eq!(parse_memory_mib("512KiB"), 0.5);
        assert_eq!(parse_memory_mib("1048576B"), 1.0);
        assert_eq!(parse_memory_mib("junk"), 0.0);
    }

    #[test]
    fn test_network_units() {
        assert_eq!(parse_size_bytes("0B"), 0);
        assert_eq!(parse_size_bytes("500kB"), 512_000);
        assert_eq!(parse_size_bytes("1MiB"), 1_048_576);
        assert_eq!(parse_size_bytes("2GB"), 2 * 1024 * 1_048_576);
    }

    // Random unit mixtures: the parser must stay total and agree with the
    // unit multiplier table for every value/unit combination.
    #[test]
    fn test_random_unit_mixtures() {
        let units: &[(&str, f64)] = &[
            ("B", 1.0),
            ("kB", 1024.0),
            ("KiB", 1024.0),
            ("MB", 1_048_576.0),
            ("MiB", 1_048_576.0),
            ("GB", 1024.0 * 1_048_576.0),
            ("GiB", 1024.0 * 1_048_576.0),
        ];
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let value: f64 = rng.gen_range(0.0..999.0);
            let (unit, multiplier) = units[rng.gen_range(0..units.len())];
            let formatted = format!("{value:.2}{unit}");

            let parsed = parse_size_bytes(&formatted);
            let expected = (format!("{value:.2}").parse::<f64>().unwrap() * multiplier) as u64;
            assert_eq!(parsed, expected, "unit {unit} value {value}");

            let mem = parse_memory_mib(&formatted);
            assert!(mem >= 0.0 && mem.is_finite());
        }
    }

    #[test]
    fn test_random_snapshot_mixtures_never_panic() {
        let mem_units = ["KiB", "MiB", "GiB", "MB", "GB"];
        let net_units = ["B", "kB", "MB", "GB"];
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let cpu: f64 = rng.gen_range(0.0..400.0);
            let usage: f64 = rng.gen_range(0.0..4096.0);
            let limit: f64 = rng.gen_range(1.0..4096.0);
            let mu = mem_units[rng.gen_range(0..mem_units.len())];
            let ml = mem_units[rng.gen_range(0..mem_units.len())];
            let nu = net_units[rng.gen_range(0..net_units.len())];

            let out = format!(
                r#"{{"cpu":"{cpu:.2}%","mem":"{usage:.2}{mu} / {limit:.2}{ml}","net":"{usage:.1}{nu} / {limit:.1}{nu}"}}"#
            );
            let sample = StatsSample::parse(&out);
            assert!(sample.cpu_percent >= 0.0);
            assert!(sample.memory_usage_mb >= 0.0);
            assert!(sample.memory_percent >= 0.0);
        }
    }
}
