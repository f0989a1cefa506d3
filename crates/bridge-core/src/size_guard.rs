/// Whether an artifact of `byte_size` may be uploaded to a destination whose
/// attachment ceiling is `ceiling` bytes.
pub fn fits(byte_size: u64, ceiling: u64) -> bool {
    byte_size <= ceiling
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_inclusive() {
        let ceiling = 8 * 1024 * 1024;
        assert!(fits(0, ceiling));
        assert!(fits(ceiling, ceiling));
        assert!(!fits(ceiling + 1, ceiling));
    }
}
