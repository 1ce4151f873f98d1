//! Built-in smoke suite: a handful of quick host-environment checks that
//! write plain text to stdout, honoring the harness's tag filter.

use std::time::Instant;

use testwatch_core::{Suite, SuiteConfig};

struct Check {
    name: &'static str,
    tags: &'static [&'static str],
    run: fn() -> bool,
}

const CHECKS: &[Check] = &[
    Check {
        name: "string-roundtrip",
        tags: &["core"],
        run: || "48213".parse::<u64>().map(|n| n.to_string()) == Ok("48213".to_string()),
    },
    Check {
        name: "worker-thread",
        tags: &["core"],
        run: || {
            std::thread::spawn(|| 6 * 7)
                .join()
                .map(|v| v == 42)
                .unwrap_or(false)
        },
    },
    Check {
        name: "clock-monotonic",
        tags: &["core"],
        run: || {
            let a = Instant::now();
            let b = Instant::now();
            b >= a
        },
    },
    Check {
        name: "loopback-resolve",
        tags: &["network", "dns"],
        run: || {
            use std::net::ToSocketAddrs;
            "localhost:80"
                .to_socket_addrs()
                .map(|mut addrs| addrs.next().is_some())
                .unwrap_or(false)
        },
    },
];

pub struct SmokeSuite;

impl Suite for SmokeSuite {
    fn run(&self, cfg: &SuiteConfig) -> i32 {
        let excluded = excluded_tags(&cfg.filter_expression);

        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut filtered = 0u32;

        for check in CHECKS {
            if check.tags.iter().any(|tag| excluded.contains(tag)) {
                filtered += 1;
                println!("test {} ... skipped (filtered)", check.name);
                continue;
            }

            let started = Instant::now();
            let ok = (check.run)();
            let elapsed_ms = started.elapsed().as_millis();

            if ok {
                passed += 1;
                if cfg.verbose_success {
                    if cfg.show_durations {
                        println!("test {} ... ok ({elapsed_ms}ms)", check.name);
                    } else {
                        println!("test {} ... ok", check.name);
                    }
                }
            } else {
                failed += 1;
                if cfg.show_durations {
                    println!("test {} ... FAILED ({elapsed_ms}ms)", check.name);
                } else {
                    println!("test {} ... FAILED", check.name);
                }
            }
        }

        println!("{passed} passed, {failed} failed, {filtered} filtered");
        failed as i32
    }
}

/// Extracts tag names from a negated-tag filter like `~[network]~[dns]`.
fn excluded_tags(filter: &str) -> Vec<&str> {
    filter
        .split("~[")
        .skip(1)
        .filter_map(|part| part.split(']').next())
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: &str) -> SuiteConfig {
        SuiteConfig {
            filter_expression: filter.to_string(),
            verbose_success: false,
            show_durations: false,
        }
    }

    #[test]
    fn excluded_tags_parses_negated_filters() {
        assert_eq!(
            excluded_tags("~[network]~[dns]~[benchmark]"),
            vec!["network", "dns", "benchmark"]
        );
        assert_eq!(excluded_tags(""), Vec::<&str>::new());
    }

    #[test]
    fn default_exclusions_pass_the_suite() {
        let code = SmokeSuite.run(&config("~[network]~[dns]~[benchmark]~[event-loop]"));
        assert_eq!(code, 0);
    }

    #[test]
    fn partial_exclusion_still_passes() {
        let code = SmokeSuite.run(&config("~[network]"));
        assert_eq!(code, 0);
    }
}
