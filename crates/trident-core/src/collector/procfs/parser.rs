//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Parsed data from `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: i32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The format is tricky because the comm field can contain spaces and parentheses.
/// Format: pid (comm) state ppid pgrp session tty_nr ...
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    // comm is delimited by the first '(' and the LAST ')'
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    let remaining = &content[close_paren + 1..];
    let fields: Vec<&str> = remaining.split_whitespace().collect();

    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let parse_field = |idx: usize, name: &str| -> Result<i64, ParseError> {
        fields
            .get(idx)
            .ok_or_else(|| ParseError::new(format!("missing field {}", name)))?
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    let parse_field_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields
            .get(idx)
            .ok_or_else(|| ParseError::new(format!("missing field {}", name)))?
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_field(1, "ppid")? as u32,
        minflt: parse_field_u64(7, "minflt")?,
        majflt: parse_field_u64(9, "majflt")?,
        utime: parse_field_u64(11, "utime")?,
        stime: parse_field_u64(12, "stime")?,
        num_threads: parse_field(17, "num_threads")? as i32,
        starttime: parse_field_u64(19, "starttime")?,
        vsize: parse_field_u64(20, "vsize")?,
        rss: parse_field(21, "rss")?,
    })
}

/// Parsed data from `/proc/[pid]/status`.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub name: String,
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub euid: u32,
    pub vm_swap: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut status = ProcStatus::default();
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    if fields.is_empty() {
        return Err(ParseError::new("empty status"));
    }

    status.name = fields.get("Name").unwrap_or(&"").to_string();
    status.pid = fields.get("Pid").and_then(|s| s.parse().ok()).unwrap_or(0);
    status.ppid = fields.get("PPid").and_then(|s| s.parse().ok()).unwrap_or(0);

    // Uid has format: real effective saved fs
    if let Some(uid_line) = fields.get("Uid") {
        let parts: Vec<&str> = uid_line.split_whitespace().collect();
        if let Some(uid) = parts.first() {
            status.uid = uid.parse().unwrap_or(0);
        }
        if let Some(euid) = parts.get(1) {
            status.euid = euid.parse().unwrap_or(0);
        }
    }

    // Memory fields are in kB format: "12345 kB"
    let parse_kb = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    status.vm_swap = parse_kb("VmSwap");

    status.voluntary_ctxt_switches = fields
        .get("voluntary_ctxt_switches")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    status.nonvoluntary_ctxt_switches = fields
        .get("nonvoluntary_ctxt_switches")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(status)
}

/// Parsed data from `/proc/[pid]/io`.
#[derive(Debug, Clone, Default)]
pub struct ProcIo {
    pub rchar: u64,
    pub wchar: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content.
///
/// Format is key: value pairs, one per line.
pub fn parse_proc_io(content: &str) -> Result<ProcIo, ParseError> {
    let mut io = ProcIo::default();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value: u64 = value.trim().parse().unwrap_or(0);
            match key.trim() {
                "rchar" => io.rchar = value,
                "wchar" => io.wchar = value,
                "read_bytes" => io.read_bytes = value,
                "write_bytes" => io.write_bytes = value,
                _ => {}
            }
        }
    }

    Ok(io)
}

/// Splits NUL-separated `/proc/[pid]/cmdline` content into arguments.
///
/// Kernel threads have an empty cmdline and yield an empty vector.
pub fn parse_cmdline(content: &str) -> Vec<String> {
    content
        .split('\0')
        .filter(|arg| !arg.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses NUL-separated `KEY=value` pairs from `/proc/[pid]/environ`.
pub fn parse_environ(content: &str) -> HashMap<String, String> {
    content
        .split('\0')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Extracts the soft "Max open files" limit from `/proc/[pid]/limits`.
///
/// Returns `None` for "unlimited" or a missing row.
pub fn parse_max_open_files(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("Max open files"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|soft| soft.parse().ok())
}

/// Parses `/proc/[pid]/wchan`. `"0"` and empty mean "not waiting".
pub fn parse_wchan(content: &str) -> Option<String> {
    let wchan = content.trim();
    if wchan.is_empty() || wchan == "0" {
        None
    } else {
        Some(wchan.to_string())
    }
}

/// Proportional memory from `/proc/[pid]/smaps_rollup`, in bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmapsRollup {
    pub pss: u64,
    pub swap_pss: u64,
}

/// Parses `/proc/[pid]/smaps_rollup` content.
pub fn parse_smaps_rollup(content: &str) -> Result<SmapsRollup, ParseError> {
    let mut rollup = SmapsRollup::default();
    let mut seen = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb: u64 = value
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        match key.trim() {
            "Pss" => {
                rollup.pss = kb * 1024;
                seen = true;
            }
            "SwapPss" => rollup.swap_pss = kb * 1024,
            _ => {}
        }
    }

    if !seen {
        return Err(ParseError::new("missing Pss in smaps_rollup"));
    }
    Ok(rollup)
}

/// Single CPU stats from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Default)]
pub struct CpuStat {
    pub cpu_id: Option<u32>, // None for aggregate "cpu" line
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

/// Global stats from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    pub cpus: Vec<CpuStat>,
    pub btime: u64,
}

impl GlobalStat {
    /// The aggregate `cpu` line, if present.
    pub fn total(&self) -> Option<&CpuStat> {
        self.cpus.iter().find(|c| c.cpu_id.is_none())
    }

    /// Per-CPU lines (`cpu0`, `cpu1`, ...).
    pub fn per_cpu(&self) -> impl Iterator<Item = &CpuStat> {
        self.cpus.iter().filter(|c| c.cpu_id.is_some())
    }
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        if parts[0].starts_with("cpu") {
            let cpu_id = if parts[0] == "cpu" {
                None
            } else {
                match parts[0].strip_prefix("cpu").and_then(|s| s.parse().ok()) {
                    Some(id) => Some(id),
                    None => continue,
                }
            };

            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };

            stat.cpus.push(CpuStat {
                cpu_id,
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_val(8),
            });
        } else if parts[0] == "btime" {
            stat.btime = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        }
    }

    if stat.cpus.is_empty() {
        return Err(ParseError::new("no cpu lines in stat"));
    }

    Ok(stat)
}

/// Parses `/etc/passwd` content and returns a map of UID -> username.
///
/// Format: username:password:uid:gid:gecos:home:shell
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3
            && let Ok(uid) = parts[2].parse::<u32>()
        {
            map.insert(uid, parts[0].to_string());
        }
    }
    map
}

/// Resolver for UID -> username mapping.
///
/// Caches the passwd file contents for efficient lookups.
#[derive(Debug, Clone, Default)]
pub struct UserResolver {
    uid_to_name: HashMap<u32, String>,
}

impl UserResolver {
    /// Creates a new empty resolver.
    pub fn new() -> Self {
        Self {
            uid_to_name: HashMap::new(),
        }
    }

    /// Loads user mappings from /etc/passwd content.
    pub fn load_from_content(&mut self, content: &str) {
        self.uid_to_name = parse_passwd(content);
    }

    /// Resolves UID to username, returns UID as string if not found.
    pub fn resolve(&self, uid: u32) -> String {
        self.uid_to_name
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    /// Returns true if resolver has any mappings.
    pub fn is_loaded(&self) -> bool {
        !self.uid_to_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd() {
        let content = "\
root:x:0:0:root:/root:/bin/bash
# comment line
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
user:x:1000:1000:User Name:/home/user:/bin/bash
";
        let map = parse_passwd(content);
        assert_eq!(map.get(&0), Some(&"root".to_string()));
        assert_eq!(map.get(&1), Some(&"daemon".to_string()));
        assert_eq!(map.get(&1000), Some(&"user".to_string()));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_user_resolver() {
        let mut resolver = UserResolver::new();
        resolver.load_from_content(
            "root:x:0:0::/root:/bin/bash\nuser:x:1000:1000::/home/user:/bin/bash",
        );

        assert_eq!(resolver.resolve(0), "root");
        assert_eq!(resolver.resolve(1000), "user");
        assert_eq!(resolver.resolve(9999), "9999");
        assert!(resolver.is_loaded());
    }

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 1234);
        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.ppid, 1233);
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.minflt, 5000);
        assert_eq!(stat.majflt, 10);
        assert_eq!(stat.starttime, 100000);
        assert_eq!(stat.vsize, 25000000);
        assert_eq!(stat.rss, 2000);
    }

    #[test]
    fn test_parse_proc_stat_with_spaces_in_comm() {
        let content = "5000 (Web Content) S 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5000);
        assert_eq!(stat.comm, "Web Content");
        assert_eq!(stat.ppid, 4999);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (test(1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 5001);
        assert_eq!(stat.comm, "test(1)");
    }

    #[test]
    fn test_parse_proc_stat_zombie() {
        let content = "4000 (defunct) Z 1000 4000 1000 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.pid, 4000);
        assert_eq!(stat.state, 'Z');
        assert_eq!(stat.vsize, 0);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        let err = parse_proc_stat("12 (x) S 1 2 3").unwrap_err();
        assert!(err.message.contains("not enough fields"));
    }

    #[test]
    fn test_parse_proc_status() {
        let content = "\
Name:\tbash
Pid:\t1234
PPid:\t1233
Uid:\t1000\t1001\t1000\t1000
VmSwap:\t     128 kB
voluntary_ctxt_switches:\t150
nonvoluntary_ctxt_switches:\t25
";
        let status = parse_proc_status(content).unwrap();

        assert_eq!(status.name, "bash");
        assert_eq!(status.ppid, 1233);
        assert_eq!(status.uid, 1000);
        assert_eq!(status.euid, 1001);
        assert_eq!(status.vm_swap, 128);
        assert_eq!(status.voluntary_ctxt_switches, 150);
        assert_eq!(status.nonvoluntary_ctxt_switches, 25);
    }

    #[test]
    fn test_parse_proc_status_empty() {
        assert!(parse_proc_status("").is_err());
    }

    #[test]
    fn test_parse_proc_io() {
        let content = "\
rchar: 323934931
wchar: 323929600
syscr: 632687
syscw: 632675
read_bytes: 4096
write_bytes: 323932160
cancelled_write_bytes: 0
";
        let io = parse_proc_io(content).unwrap();

        assert_eq!(io.rchar, 323934931);
        assert_eq!(io.read_bytes, 4096);
        assert_eq!(io.write_bytes, 323932160);
    }

    #[test]
    fn test_parse_cmdline() {
        assert_eq!(
            parse_cmdline("/usr/bin/python3\0worker.py\0--queue\0"),
            vec!["/usr/bin/python3", "worker.py", "--queue"]
        );
        assert!(parse_cmdline("").is_empty());
    }

    #[test]
    fn test_parse_environ() {
        let env = parse_environ("HOME=/root\0APP_ROLE=worker\0EMPTY=\0garbage\0");
        assert_eq!(env.get("HOME").map(String::as_str), Some("/root"));
        assert_eq!(env.get("APP_ROLE").map(String::as_str), Some("worker"));
        assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_parse_max_open_files() {
        let content = "\
Limit                     Soft Limit           Hard Limit           Units
Max cpu time              unlimited            unlimited            seconds
Max open files            1024                 524288               files
";
        assert_eq!(parse_max_open_files(content), Some(1024));

        let unlimited = "Max open files            unlimited    unlimited    files\n";
        assert_eq!(parse_max_open_files(unlimited), None);
    }

    #[test]
    fn test_parse_wchan() {
        assert_eq!(parse_wchan("do_wait"), Some("do_wait".to_string()));
        assert_eq!(parse_wchan("0"), None);
        assert_eq!(parse_wchan(""), None);
    }

    #[test]
    fn test_parse_smaps_rollup() {
        let content = "\
55d0c0a00000-7ffd8a5f3000 ---p 00000000 00:00 0                          [rollup]
Rss:                3412 kB
Pss:                1204 kB
Swap:                 64 kB
SwapPss:              32 kB
";
        let rollup = parse_smaps_rollup(content).unwrap();
        assert_eq!(rollup.pss, 1204 * 1024);
        assert_eq!(rollup.swap_pss, 32 * 1024);
        assert!(parse_smaps_rollup("Rss: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_global_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 5000 250 1500 40000 500 100 50 0 0 0
cpu1 5000 250 1500 40000 500 100 50 0 0 0
intr 1000000 50 0 0
ctxt 500000
btime 1700000000
";
        let stat = parse_global_stat(content).unwrap();

        assert_eq!(stat.cpus.len(), 3);
        assert_eq!(stat.btime, 1700000000);
        let total = stat.total().unwrap();
        assert_eq!(total.user, 10000);
        assert_eq!(total.system, 3000);
        assert_eq!(total.idle, 80000);
        let ids: Vec<u32> = stat.per_cpu().filter_map(|c| c.cpu_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_parse_global_stat_without_cpus() {
        assert!(parse_global_stat("btime 1\n").is_err());
    }
}
