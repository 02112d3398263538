use prelude::flame::{self, Span};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;
use std::time::Duration;

/// Time spent in each timed phase of the run, from the flame spans recorded on this thread.
pub struct Profile {
    spans: Vec<Span>,
    phases: BTreeMap<String, Phase>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Phase {
    pub calls: usize,
    pub total: Duration,
}

impl Profile {
    pub fn collect() -> Profile {
        let spans = flame::spans();
        let mut phases = BTreeMap::new();
        tally(&spans, &mut phases);
        Profile {
            spans: fold(spans),
            phases,
        }
    }

    pub fn phases(&self) -> &BTreeMap<String, Phase> {
        &self.phases
    }

    pub fn print_summary(&self) {
        for (name, phase) in &self.phases {
            let total_ms = phase.total.as_secs_f64() * 1e3;
            println!(
                "{:>16}: {:6} calls, {:9.1} ms total, {:7.3} ms mean",
                name,
                phase.calls,
                total_ms,
                total_ms / phase.calls as f64
            );
        }
    }

    /// Writes an html flame graph in which every control cycle is stacked into one column.
    pub fn write_html<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        flame::dump_html_custom(&mut File::create(path)?, &self.spans)
    }
}

fn tally(spans: &[Span], phases: &mut BTreeMap<String, Phase>) {
    for span in spans {
        let phase = phases.entry(span.name.to_string()).or_default();
        phase.calls += 1;
        phase.total += Duration::from_nanos(span.delta);
        tally(&span.children, phases);
    }
}

// Siblings share a depth, so spans with the same name under the same parent fold into the first.
fn fold(spans: Vec<Span>) -> Vec<Span> {
    let mut folded: Vec<Span> = Vec::new();
    for mut span in spans {
        match folded.iter_mut().find(|f| f.name == span.name) {
            Some(first) => {
                first.delta += span.delta;
                first.children.append(&mut span.children);
            }
            None => folded.push(span),
        }
    }

    for span in &mut folded {
        let children = mem::replace(&mut span.children, Vec::new());
        span.children = fold(children);
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_cycles(n: usize) {
        for _ in 0..n {
            let _cycle = flame::start_guard("cycle");
            flame::span_of("solve", || ());
            flame::span_of("step", || ());
            flame::span_of("solve", || ());
        }
    }

    #[test]
    fn cycles_fold_into_one_column() {
        flame::clear();
        record_cycles(3);

        let profile = Profile::collect();
        assert_eq!(profile.spans.len(), 1);
        let names: Vec<_> = profile.spans[0].children.iter().map(|s| s.name.to_string()).collect();
        assert_eq!(names, vec!["solve", "step"]);

        assert_eq!(profile.phases()["cycle"].calls, 3);
        assert_eq!(profile.phases()["solve"].calls, 6);
        assert_eq!(profile.phases()["step"].calls, 3);
    }

    #[test]
    fn folded_time_is_the_sum() {
        flame::clear();
        record_cycles(4);

        let profile = Profile::collect();
        let folded = Duration::from_nanos(profile.spans[0].delta);
        assert_eq!(folded, profile.phases()["cycle"].total);
    }
}
