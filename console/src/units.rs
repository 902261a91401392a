//! Human-readable scaling for counters and durations

/// Scale a count with T/G/M/K suffixes at `fixed` decimal places.
///
/// Values at or below 1000 are printed as-is.
pub fn scale_number(n: f64, fixed: usize) -> String {
    const STEPS: [(f64, &str); 4] = [
        (1_000_000_000_000.0, "T"),
        (1_000_000_000.0, "G"),
        (1_000_000.0, "M"),
        (1_000.0, "K"),
    ];
    for (divisor, suffix) in STEPS {
        if n > divisor {
            return format!("{:.*}{}", fixed, n / divisor, suffix);
        }
    }
    n.to_string()
}

/// Scale a nanosecond duration. Zero renders as an empty string.
pub fn scale_nanos(n: u64) -> String {
    if n == 0 {
        return String::new();
    }
    let v = n as f64;
    if n > 1_000_000_000 {
        format!("{:.2}s", v / 1_000_000_000.0)
    } else if n > 1_000_000 {
        format!("{:.2}ms", v / 1_000_000.0)
    } else if n > 1_000 {
        format!("{:.2}µs", v / 1_000.0)
    } else {
        format!("{n}ns")
    }
}

/// Coarse latency grade used when printing RTTs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RttBand {
    Good,
    Fair,
    Poor,
}

impl RttBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RttBand::Good => "good",
            RttBand::Fair => "fair",
            RttBand::Poor => "poor",
        }
    }
}

pub fn rtt_band(rtt_ms: f64) -> RttBand {
    if rtt_ms <= 100.0 {
        RttBand::Good
    } else if rtt_ms <= 150.0 {
        RttBand::Fair
    } else {
        RttBand::Poor
    }
}
