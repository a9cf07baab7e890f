use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Produces the stdin payload for one ladder size.
pub trait InputGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self, size: u64) -> String;
}

/// Writes the size alone: `"{n}\n"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeEcho;

impl InputGenerator for SizeEcho {
    fn name(&self) -> &'static str {
        "size-echo"
    }

    fn generate(&self, size: u64) -> String {
        format!("{}\n", size)
    }
}

/// Writes `n` on the first line and `n` pseudo-random integers on the second.
/// Output depends only on the seed and the size.
#[derive(Debug, Clone, Copy)]
pub struct ArrayOfSize {
    pub seed: u64,
    pub max_value: u64,
}

impl ArrayOfSize {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_value: 1_000_000_000,
        }
    }
}

impl InputGenerator for ArrayOfSize {
    fn name(&self) -> &'static str {
        "array-of-size"
    }

    fn generate(&self, size: u64) -> String {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ size);
        let mut out = String::with_capacity(size as usize * 8 + 16);
        out.push_str(&size.to_string());
        out.push('\n');
        let max_value = self.max_value.max(1);
        for i in 0..size {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&rng.gen_range(0..max_value).to_string());
        }
        out.push('\n');
        out
    }
}

/// Resolve a generator by name.
pub fn generator_for(name: &str, seed: u64) -> Option<Box<dyn InputGenerator>> {
    match name {
        "size-echo" | "echo" => Some(Box::new(SizeEcho)),
        "array-of-size" | "array" => Some(Box::new(ArrayOfSize::new(seed))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_echo() {
        assert_eq!(SizeEcho.generate(0), "0\n");
        assert_eq!(SizeEcho.generate(5000), "5000\n");
    }

    #[test]
    fn test_array_shape() {
        let text = ArrayOfSize::new(7).generate(5);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("5"));
        assert_eq!(lines.next().unwrap().split(' ').count(), 5);
        assert_eq!(ArrayOfSize::new(7).generate(0), "0\n\n");
    }

    #[test]
    fn test_array_is_deterministic_per_seed() {
        let a = ArrayOfSize::new(1);
        assert_eq!(a.generate(100), a.generate(100));
        assert_ne!(a.generate(100), ArrayOfSize::new(2).generate(100));
    }

    #[test]
    fn test_array_values_stay_below_max() {
        let generator = ArrayOfSize {
            seed: 11,
            max_value: 10,
        };
        let text = generator.generate(200);
        let values: Vec<u64> = text
            .lines()
            .nth(1)
            .unwrap()
            .split(' ')
            .map(|v| v.parse().unwrap())
            .collect();
        assert_eq!(values.len(), 200);
        assert!(values.iter().all(|v| *v < 10));
    }

    #[test]
    fn test_generator_lookup() {
        assert_eq!(generator_for("echo", 0).unwrap().name(), "size-echo");
        assert_eq!(generator_for("array", 3).unwrap().name(), "array-of-size");
        assert!(generator_for("graph", 0).is_none());
    }
}
