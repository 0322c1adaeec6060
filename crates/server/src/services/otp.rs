//! One-time passcode generation.

use rand::{CryptoRng, Rng};

use signup_core::Otp;

/// Generate a passcode from the thread-local CSPRNG.
#[must_use]
pub fn generate_otp() -> Otp {
    generate_otp_with(&mut rand::rng())
}

/// Generate a passcode from `rng`.
///
/// `random_range` samples uniformly (widening multiply with rejection), so
/// every one of the 900 000 codes is equally likely.
#[must_use]
pub fn generate_otp_with<R: CryptoRng>(rng: &mut R) -> Otp {
    Otp::from_offset(rng.random_range(0..Otp::SPAN))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    const DRAWS: usize = 100_000;
    const BUCKETS: usize = 90;

    #[test]
    fn test_draws_stay_in_range() {
        for _ in 0..DRAWS {
            let otp = generate_otp().as_u32();
            assert!((Otp::MIN..=Otp::MAX).contains(&otp), "out of range: {otp}");
            assert_eq!(otp.to_string().len(), 6);
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn test_distribution_is_uniform() {
        let mut rng = StdRng::seed_from_u64(0x5EED_0F07);
        let bucket_width = Otp::SPAN / BUCKETS as u32;
        let mut counts = [0_u64; BUCKETS];

        for _ in 0..DRAWS {
            let offset = generate_otp_with(&mut rng).as_u32() - Otp::MIN;
            let bucket = (offset / bucket_width) as usize;
            if let Some(count) = counts.get_mut(bucket) {
                *count += 1;
            }
        }

        let expected = DRAWS as f64 / BUCKETS as f64;
        let chi_square: f64 = counts
            .iter()
            .map(|&observed| {
                let diff = observed as f64 - expected;
                diff * diff / expected
            })
            .sum();

        // 89 degrees of freedom; p = 0.0001 lies near 141.
        assert!(chi_square < 150.0, "chi-square {chi_square:.1}");
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_no_low_end_bias() {
        let mut rng = StdRng::seed_from_u64(42);
        let midpoint = Otp::MIN + Otp::SPAN / 2;
        let low = (0..DRAWS)
            .filter(|_| generate_otp_with(&mut rng).as_u32() < midpoint)
            .count();

        let share = low as f64 / DRAWS as f64;
        assert!((share - 0.5).abs() < 0.01, "low half share {share:.4}");
    }
}
