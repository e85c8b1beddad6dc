//! Pipe-delimited record formats written to syslog.
//!
//! Every record is a single line of `|`-separated fields. Percentages and
//! temperatures carry one decimal, always with `.` as the decimal point.
//! Each record type can be parsed back, which the tests use to check that
//! nothing is lost between formatting and the wire.

/// Number of thermal positions in a thermal record.
pub const THERMAL_FIELDS: usize = 7;

// ---------------------------------------------------------------------------
// procinfo
// ---------------------------------------------------------------------------

/// `<group>|<user%>|<sys%>|<total%>|<rss>|<vsz>`
#[derive(Debug, Clone, PartialEq)]
pub struct ProcinfoRecord {
    pub group: String,
    pub user_pct: f64,
    pub sys_pct: f64,
    pub total_pct: f64,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

impl ProcinfoRecord {
    pub fn format(&self) -> String {
        format!(
            "{}|{:.1}|{:.1}|{:.1}|{}|{}",
            self.group,
            self.user_pct,
            self.sys_pct,
            self.total_pct,
            self.resident_bytes,
            self.virtual_bytes
        )
    }

    /// Parses a record; the group name may itself contain `|`.
    pub fn parse(record: &str) -> Option<Self> {
        let mut fields = record.trim_end_matches('\n').rsplitn(6, '|');
        let virtual_bytes = fields.next()?.parse().ok()?;
        let resident_bytes = fields.next()?.parse().ok()?;
        let total_pct = fields.next()?.parse().ok()?;
        let sys_pct = fields.next()?.parse().ok()?;
        let user_pct = fields.next()?.parse().ok()?;
        let group = fields.next()?.to_string();
        Some(Self {
            group,
            user_pct,
            sys_pct,
            total_pct,
            resident_bytes,
            virtual_bytes,
        })
    }
}

// ---------------------------------------------------------------------------
// cpu
// ---------------------------------------------------------------------------

/// `<name>|<user%>|<sys%>|<idle%>|<user+sys%>`, name `cpu` or `cpu<N>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuRecord {
    pub name: String,
    pub user_pct: f64,
    pub sys_pct: f64,
    pub idle_pct: f64,
    pub total_pct: f64,
}

impl CpuRecord {
    pub fn format(&self) -> String {
        format!(
            "{}|{:.1}|{:.1}|{:.1}|{:.1}",
            self.name, self.user_pct, self.sys_pct, self.idle_pct, self.total_pct
        )
    }

    pub fn parse(record: &str) -> Option<Self> {
        let fields: Vec<&str> = record.trim_end_matches('\n').split('|').collect();
        let [name, user, sys, idle, total] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            name: name.to_string(),
            user_pct: user.parse().ok()?,
            sys_pct: sys.parse().ok()?,
            idle_pct: idle.parse().ok()?,
            total_pct: total.parse().ok()?,
        })
    }
}

// ---------------------------------------------------------------------------
// cpufreq
// ---------------------------------------------------------------------------

/// `<name>:<hz>(|<name>:<hz>)*`
pub fn format_cpufreq(freqs: &[(String, u64)]) -> String {
    freqs
        .iter()
        .map(|(name, hz)| format!("{}:{}", name, hz))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn parse_cpufreq(record: &str) -> Option<Vec<(String, u64)>> {
    record
        .trim_end_matches('\n')
        .split('|')
        .map(|token| {
            let (name, hz) = token.rsplit_once(':')?;
            Some((name.to_string(), hz.parse().ok()?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// thermal
// ---------------------------------------------------------------------------

/// Seven positional `%.1f` temperatures, zones 0..6.
pub fn format_thermal(celsius: &[f64; THERMAL_FIELDS]) -> String {
    celsius
        .iter()
        .map(|t| format!("{:.1}", t))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn parse_thermal(record: &str) -> Option<[f64; THERMAL_FIELDS]> {
    let mut out = [0.0; THERMAL_FIELDS];
    let mut fields = record.trim_end_matches('\n').split('|');
    for slot in out.iter_mut() {
        *slot = fields.next()?.parse().ok()?;
    }
    fields.next().is_none().then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procinfo_format() {
        let record = ProcinfoRecord {
            group: "python".to_string(),
            user_pct: 33.333,
            sys_pct: 1.24,
            total_pct: 34.583,
            resident_bytes: 1_048_576,
            virtual_bytes: 10_485_760,
        };
        assert_eq!(record.format(), "python|33.3|1.2|34.6|1048576|10485760");
    }

    #[test]
    fn test_procinfo_reparse() {
        let record = ProcinfoRecord {
            group: "java:app|blue".to_string(),
            user_pct: 12.5,
            sys_pct: 0.1,
            total_pct: 12.6,
            resident_bytes: 42,
            virtual_bytes: 4242,
        };
        assert_eq!(ProcinfoRecord::parse(&record.format()), Some(record));
        assert_eq!(ProcinfoRecord::parse("a|1.0|x|1.0|1|1"), None);
        assert_eq!(ProcinfoRecord::parse("a|1.0"), None);
    }

    #[test]
    fn test_cpu_record() {
        let record = CpuRecord {
            name: "cpu3".to_string(),
            user_pct: 10.0,
            sys_pct: 2.5,
            idle_pct: 87.5,
            total_pct: 12.5,
        };
        let line = record.format();
        assert_eq!(line, "cpu3|10.0|2.5|87.5|12.5");
        assert_eq!(CpuRecord::parse(&line), Some(record));
        assert_eq!(CpuRecord::parse("cpu|1.0|2.0"), None);
    }

    #[test]
    fn test_cpufreq_record() {
        let freqs = vec![
            ("0".to_string(), 1_800_000_000),
            ("1".to_string(), 408_000_000),
        ];
        let line = format_cpufreq(&freqs);
        assert_eq!(line, "0:1800000000|1:408000000");
        assert_eq!(parse_cpufreq(&line), Some(freqs));
        assert_eq!(parse_cpufreq("0:fast"), None);
    }

    #[test]
    fn test_thermal_record() {
        let temps = [45.0, 47.5, 41.2, 0.0, 0.0, 38.1, -3.5];
        let line = format_thermal(&temps);
        assert_eq!(line, "45.0|47.5|41.2|0.0|0.0|38.1|-3.5");
        assert_eq!(parse_thermal(&line), Some(temps));
        assert_eq!(parse_thermal("1.0|2.0"), None);
        assert_eq!(parse_thermal(&format!("{}|9.9", line)), None);
    }
}
