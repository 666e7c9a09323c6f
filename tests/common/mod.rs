use dreadlock_instrument::{InstrumentOptions, Instrumented, instrument, scan};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[allow(dead_code)]
pub const BOOKKEEPING: &str = "aids Dreadlock's bookkeeping";

/// Instrument source text with default options
#[allow(dead_code)]
pub fn instrument_default(src: &str) -> Instrumented {
    instrument::instrument(&scan(src), &InstrumentOptions::default())
        .expect("instrumentation should succeed")
}

/// The lines of `src` split the way the scanner splits them
#[allow(dead_code)]
pub fn source_lines(src: &str) -> Vec<String> {
    scan(src).into_lines()
}

/// Number of synthetic statements starting with `stem`
#[allow(dead_code)]
pub fn count_synthetic(lines: &[String], stem: &str) -> usize {
    lines
        .iter()
        .filter(|l| l.contains(BOOKKEEPING) && l.trim_start().starts_with(stem))
        .count()
}

/// A randomly generated translation unit and what instrumenting it must yield
#[allow(dead_code)]
pub struct GeneratedUnit {
    pub source: String,
    /// Real `std::unique_lock` declarations
    pub declarations: usize,
    /// Declarations still held when their scope closes
    pub held_at_exit: usize,
    /// `.lock()`/`.unlock()` calls on tracked locks
    pub calls: usize,
}

struct Generator {
    rng: StdRng,
    out: String,
    next: usize,
    declarations: usize,
    held_at_exit: usize,
    calls: usize,
}

impl Generator {
    fn id(&mut self) -> usize {
        self.next += 1;
        self.next
    }

    fn line(&mut self, indent: &str, text: &str) {
        self.out.push_str(indent);
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn declaration(&mut self, indent: &str) {
        let n = self.id();
        self.declarations += 1;
        match self.rng.random_range(0..3) {
            0 => {
                self.line(indent, &format!("std::unique_lock<std::mutex> lk{n}(m{n});"));
                if self.rng.random_bool(0.3) {
                    self.line(indent, &format!("lk{n}.unlock();"));
                    self.calls += 1;
                } else {
                    self.held_at_exit += 1;
                }
            }
            1 => {
                self.line(
                    indent,
                    &format!("std::unique_lock<std::mutex> lk{n}(m{n}, std::defer_lock);"),
                );
                if self.rng.random_bool(0.5) {
                    self.line(indent, &format!("lk{n}.lock();"));
                    self.calls += 1;
                    self.held_at_exit += 1;
                }
            }
            _ => {
                self.line(
                    indent,
                    &format!("std::unique_lock<std::mutex> lk{n}(state->m{n});"),
                );
                self.held_at_exit += 1;
            }
        }
    }

    fn noise(&mut self, indent: &str) {
        let n = self.id();
        match self.rng.random_range(0..4) {
            0 => self.line(indent, &format!("const char* s{n} = \"{{ \\\"}}\\\" {{\";")),
            1 => self.line(indent, &format!("char b{n} = '{{';")),
            2 => self.line(
                indent,
                &format!("// {{ std::unique_lock<std::mutex> fake{n}(m{n});"),
            ),
            _ => {
                self.line(indent, "/* } unbalanced {");
                self.line(
                    indent,
                    &format!("   std::unique_lock<std::mutex> fake{n}(m{n}); lk.lock(); */"),
                );
            }
        }
    }

    fn block(&mut self, depth: usize) {
        let indent = "    ".repeat(depth);
        let statements = self.rng.random_range(1..=5);
        for _ in 0..statements {
            match self.rng.random_range(0..7) {
                0 | 1 => self.declaration(&indent),
                2 | 3 => self.noise(&indent),
                4 if depth < 4 => {
                    let n = self.id();
                    self.line(&indent, &format!("if (c > {n})"));
                    self.line(&indent, "{");
                    self.block(depth + 1);
                    self.line(&indent, "}");
                }
                _ => {
                    let n = self.id();
                    self.line(&indent, &format!("c += {n};"));
                }
            }
        }
        if self.rng.random_bool(0.3) {
            self.line(&indent, "return c;");
        }
    }
}

/// Generate a function with randomly nested blocks of locks and noise
///
/// Noise lines hide braces and declarations inside strings, character
/// literals and comments.
#[allow(dead_code)]
pub fn generate_unit(seed: u64) -> GeneratedUnit {
    let mut generator = Generator {
        rng: StdRng::seed_from_u64(seed),
        out: String::new(),
        next: 0,
        declarations: 0,
        held_at_exit: 0,
        calls: 0,
    };

    generator.out.push_str("#include <mutex>\n\nint worker(int c)\n{\n");
    generator.block(1);
    generator.out.push_str("}\n");

    GeneratedUnit {
        source: generator.out,
        declarations: generator.declarations,
        held_at_exit: generator.held_at_exit,
        calls: generator.calls,
    }
}
