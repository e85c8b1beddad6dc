//! Pre-built mock filesystem scenarios and fixture builders for testing.
//!
//! `ProcFixture` renders realistic `/proc/[pid]/{stat,status,io,...}` files
//! from a handful of fields, so tests can say "pid 100, user time 50 s" and
//! let the fixture produce the 52-field stat line.

use super::filesystem::MockFs;
use std::path::PathBuf;

/// Clock ticks per second used when rendering stat lines.
const FIXTURE_HZ: f64 = 100.0;

/// Command line of the python worker (pid 2000) in [`MockFs::typical_system`].
pub const WORKER_CMDLINE: &[&str] = &["/usr/bin/python3", "/opt/app/worker.py", "--queue", "jobs"];

/// Builder for a single mocked process.
#[derive(Debug, Clone)]
pub struct ProcFixture {
    pub pid: u32,
    pub ppid: u32,
    pub comm: String,
    pub cmdline: Vec<String>,
    pub state: char,
    pub uid: u32,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_ticks: u64,
    pub minflt: u64,
    pub majflt: u64,
    pub vsize: u64,
    pub rss_pages: u64,
    pub vm_swap_kb: u64,
    pub voluntary_ctxt: u64,
    pub nonvoluntary_ctxt: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub fds: Option<usize>,
    pub max_open_files: Option<u64>,
    pub wchan: Option<String>,
    pub environ: Vec<(String, String)>,
}

impl ProcFixture {
    /// Creates a sleeping process with the given comm, parented to init.
    pub fn new(pid: u32, comm: &str) -> Self {
        Self {
            pid,
            ppid: 1,
            comm: comm.to_string(),
            cmdline: vec![comm.to_string()],
            state: 'S',
            uid: 0,
            utime_ticks: 0,
            stime_ticks: 0,
            start_ticks: u64::from(pid) * 10,
            minflt: 0,
            majflt: 0,
            vsize: 10 * 1024 * 1024,
            rss_pages: 256,
            vm_swap_kb: 0,
            voluntary_ctxt: 0,
            nonvoluntary_ctxt: 0,
            read_bytes: 0,
            write_bytes: 0,
            fds: None,
            max_open_files: None,
            wchan: None,
            environ: Vec::new(),
        }
    }

    pub fn ppid(mut self, ppid: u32) -> Self {
        self.ppid = ppid;
        self
    }

    pub fn cmdline(mut self, args: &[&str]) -> Self {
        self.cmdline = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn state(mut self, state: char) -> Self {
        self.state = state;
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    /// Sets CPU time in seconds (rendered as ticks).
    pub fn cpu_secs(mut self, user: f64, system: f64) -> Self {
        self.utime_ticks = (user * FIXTURE_HZ).round() as u64;
        self.stime_ticks = (system * FIXTURE_HZ).round() as u64;
        self
    }

    /// Sets the start time in clock ticks since boot.
    pub fn start_ticks(mut self, ticks: u64) -> Self {
        self.start_ticks = ticks;
        self
    }

    pub fn faults(mut self, minflt: u64, majflt: u64) -> Self {
        self.minflt = minflt;
        self.majflt = majflt;
        self
    }

    pub fn memory(mut self, vsize: u64, rss_pages: u64, vm_swap_kb: u64) -> Self {
        self.vsize = vsize;
        self.rss_pages = rss_pages;
        self.vm_swap_kb = vm_swap_kb;
        self
    }

    pub fn ctxt(mut self, voluntary: u64, nonvoluntary: u64) -> Self {
        self.voluntary_ctxt = voluntary;
        self.nonvoluntary_ctxt = nonvoluntary;
        self
    }

    pub fn io(mut self, read_bytes: u64, write_bytes: u64) -> Self {
        self.read_bytes = read_bytes;
        self.write_bytes = write_bytes;
        self
    }

    pub fn fds(mut self, open: usize, limit: u64) -> Self {
        self.fds = Some(open);
        self.max_open_files = Some(limit);
        self
    }

    pub fn wchan(mut self, wchan: &str) -> Self {
        self.wchan = Some(wchan.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.environ.push((key.to_string(), value.to_string()));
        self
    }

    /// Renders `/proc/[pid]/stat`.
    pub fn stat_line(&self) -> String {
        format!(
            "{pid} ({comm}) {state} {ppid} {pid} {pid} 0 -1 4194304 {minflt} 0 {majflt} 0 \
             {utime} {stime} 0 0 20 0 1 0 {start} {vsize} {rss} 18446744073709551615 \
             1 1 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            pid = self.pid,
            comm = self.comm,
            state = self.state,
            ppid = self.ppid,
            minflt = self.minflt,
            majflt = self.majflt,
            utime = self.utime_ticks,
            stime = self.stime_ticks,
            start = self.start_ticks,
            vsize = self.vsize,
            rss = self.rss_pages,
        )
    }

    /// Renders `/proc/[pid]/status`.
    pub fn status(&self) -> String {
        format!(
            "Name:\t{comm}\nState:\t{state}\nPid:\t{pid}\nPPid:\t{ppid}\n\
             Uid:\t{uid}\t{uid}\t{uid}\t{uid}\nGid:\t{uid}\t{uid}\t{uid}\t{uid}\n\
             VmSize:\t{vsize_kb} kB\nVmRSS:\t{rss_kb} kB\nVmSwap:\t{swap} kB\n\
             voluntary_ctxt_switches:\t{vctx}\nnonvoluntary_ctxt_switches:\t{nvctx}\n",
            comm = self.comm,
            state = self.state,
            pid = self.pid,
            ppid = self.ppid,
            uid = self.uid,
            vsize_kb = self.vsize / 1024,
            rss_kb = self.rss_pages * 4,
            swap = self.vm_swap_kb,
            vctx = self.voluntary_ctxt,
            nvctx = self.nonvoluntary_ctxt,
        )
    }

    /// Renders `/proc/[pid]/io`.
    pub fn io_file(&self) -> String {
        format!(
            "rchar: {r}\nwchar: {w}\nsyscr: 0\nsyscw: 0\n\
             read_bytes: {r}\nwrite_bytes: {w}\ncancelled_write_bytes: 0\n",
            r = self.read_bytes,
            w = self.write_bytes,
        )
    }

    /// Renders `/proc/[pid]/cmdline` (NUL-terminated argv).
    pub fn cmdline_file(&self) -> String {
        self.cmdline.iter().map(|a| format!("{}\0", a)).collect()
    }
}

impl MockFs {
    /// Adds (or replaces) a process rendered from a fixture.
    pub fn add_fixture(&mut self, fixture: &ProcFixture) {
        let pid = fixture.pid;
        self.add_process(
            pid,
            &fixture.stat_line(),
            &fixture.status(),
            &fixture.io_file(),
            &fixture.cmdline_file(),
        );

        let base = PathBuf::from(format!("/proc/{}", pid));
        if let Some(open) = fixture.fds {
            self.add_fds(pid, open);
        }
        if let Some(limit) = fixture.max_open_files {
            self.add_file(
                base.join("limits"),
                format!(
                    "Limit                     Soft Limit           Hard Limit           Units\n\
                     Max open files            {limit}                 524288               files\n"
                ),
            );
        }
        if let Some(ref wchan) = fixture.wchan {
            self.add_file(base.join("wchan"), wchan.clone());
        }
        if !fixture.environ.is_empty() {
            let environ: String = fixture
                .environ
                .iter()
                .map(|(k, v)| format!("{}={}\0", k, v))
                .collect();
            self.add_file(base.join("environ"), environ);
        }
    }

    /// Removes a process, as if it had exited.
    pub fn remove_process(&mut self, pid: u32) {
        self.remove(format!("/proc/{}", pid));
    }

    /// Writes `/proc/stat` with the given per-CPU `(user, system, idle)` ticks.
    ///
    /// The aggregate `cpu` line is the sum of the per-CPU lines.
    pub fn set_cpu_stat(&mut self, cpus: &[(u64, u64, u64)]) {
        let mut total = (0, 0, 0);
        for (u, s, i) in cpus {
            total = (total.0 + u, total.1 + s, total.2 + i);
        }
        let (u, s, i) = total;
        let mut content = format!("cpu  {u} 0 {s} {i} 0 0 0 0 0 0\n");
        for (id, (u, s, i)) in cpus.iter().enumerate() {
            content.push_str(&format!("cpu{id} {u} 0 {s} {i} 0 0 0 0 0 0\n"));
        }
        content.push_str("ctxt 500000\nbtime 1700000000\nprocesses 10000\n");
        content.push_str("procs_running 2\nprocs_blocked 0\n");
        self.add_file("/proc/stat", content);
    }

    /// Sets the current scaling frequency (kHz) of one CPU.
    pub fn set_cpu_freq(&mut self, cpu: u32, khz: u64) {
        self.add_file(
            format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/scaling_cur_freq"),
            format!("{}\n", khz),
        );
    }

    /// Adds a thermal zone with its temperature in milli-degrees Celsius.
    pub fn set_thermal_zone(&mut self, zone: u32, zone_type: &str, millicelsius: i64) {
        let base = format!("/sys/class/thermal/thermal_zone{}", zone);
        self.add_file(format!("{}/type", base), format!("{}\n", zone_type));
        self.add_file(format!("{}/temp", base), format!("{}\n", millicelsius));
    }

    /// Creates a typical system: init, a shell, a python worker tree, four
    /// CPUs with cpufreq, and three thermal zones.
    ///
    /// Process tree:
    /// ```text
    /// 1 systemd
    /// ├── 1000 bash
    /// └── 2000 python3 worker.py
    ///     └── 2001 sh
    ///         └── 2002 awk
    /// ```
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/etc/passwd",
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
user:x:1000:1000:User:/home/user:/bin/bash
",
        );

        fs.set_cpu_stat(&[
            (2500, 750, 20000),
            (2500, 750, 20000),
            (2500, 750, 20000),
            (2500, 750, 20000),
        ]);

        fs.add_fixture(
            &ProcFixture::new(1, "systemd")
                .ppid(0)
                .cmdline(&["/sbin/init", "splash"])
                .cpu_secs(1.0, 2.0)
                .start_ticks(1)
                .fds(64, 1024),
        );
        fs.add_fixture(
            &ProcFixture::new(1000, "bash")
                .uid(1000)
                .cmdline(&["-bash"])
                .cpu_secs(0.5, 0.1)
                .start_ticks(100_000)
                .fds(4, 1024)
                .wchan("do_wait"),
        );
        fs.add_fixture(
            &ProcFixture::new(2000, "python3")
                .uid(1000)
                .cmdline(WORKER_CMDLINE)
                .cpu_secs(10.0, 1.0)
                .start_ticks(200_000)
                .io(4096, 8192)
                .fds(16, 1024)
                .env("APP_ROLE", "worker"),
        );
        fs.add_fixture(
            &ProcFixture::new(2001, "sh")
                .ppid(2000)
                .uid(1000)
                .cmdline(&["/bin/sh", "-c", "awk '{print}'"])
                .start_ticks(200_100),
        );
        fs.add_fixture(
            &ProcFixture::new(2002, "awk")
                .ppid(2001)
                .uid(1000)
                .cmdline(&["awk", "{print}"])
                .state('R')
                .start_ticks(200_200),
        );

        for cpu in 0..4 {
            fs.set_cpu_freq(cpu, 1_800_000);
        }

        fs.set_thermal_zone(0, "soc-thermal", 45_000);
        fs.set_thermal_zone(1, "bigcore0-thermal", 47_500);
        fs.set_thermal_zone(2, "gpu-thermal", 41_300);

        fs
    }
}
