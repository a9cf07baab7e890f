// Classifier latency benchmark
// Measures profile -> verdict latency for synthetic series.
// Target: p95 < 1ms per classification (no oracle).

use perfbox::config::settings::ClassifierSettings;
use perfbox::verdict::ComplexityClassifier;
use perfbox::ExecutionProfile;
use std::time::{Duration, Instant};

const ITERATIONS: usize = 10_000;
const WARMUP_ITERATIONS: usize = 500;
const SIZES: [u64; 7] = [0, 1, 1000, 5000, 10000, 50000, 100000];

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();
        let at = |q: f64| samples[((len as f64 * q) as usize).min(len - 1)];
        let sum: Duration = samples.iter().sum();
        Self {
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            max: samples[len - 1],
            mean: sum / len as u32,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

fn profile(runtime: impl Fn(f64) -> f64) -> ExecutionProfile {
    let runtimes = SIZES.iter().map(|n| runtime(*n as f64)).collect();
    ExecutionProfile::from_series(SIZES.to_vec(), runtimes, vec![4.0; SIZES.len()])
        .unwrap_or_else(|e| panic!("invalid synthetic profile: {}", e))
}

fn benchmark(scenario: &str, profile: &ExecutionProfile) -> bool {
    let classifier = ComplexityClassifier::new(ClassifierSettings::default());
    for _ in 0..WARMUP_ITERATIONS {
        let _ = classifier.classify(profile);
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    let mut label = String::new();
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let verdict = classifier.classify(profile);
        samples.push(start.elapsed());
        if let Ok(verdict) = verdict {
            label = verdict.complexity().to_string();
        }
    }

    let stats = LatencyStats::from_samples(samples);
    println!("\n=== {} -> {} ===", scenario, label);
    stats.print("Latency");

    let passed = stats.p95 < Duration::from_millis(1);
    if passed {
        println!("✅ PASS");
    } else {
        println!("❌ FAIL: p95={:?} (target <1ms)", stats.p95);
    }
    passed
}

fn main() {
    println!("=== perfbox Classifier Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let scenarios = [
        ("Linear", profile(|n| 0.5 + n * 1e-4)),
        ("Quadratic", profile(|n| 0.5 + n * n * 1e-7)),
        ("Ambiguous", profile(|n| 0.5 + n.powf(1.6) * 1e-5)),
    ];

    let results: Vec<bool> = scenarios
        .iter()
        .map(|(name, profile)| benchmark(name, profile))
        .collect();
    let passed = results.iter().filter(|p| **p).count();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed, results.len());
    if passed == results.len() {
        println!("✅ All latency budgets met");
        std::process::exit(0);
    } else {
        println!("❌ Some latency budgets exceeded");
        std::process::exit(1);
    }
}
