//! DRAM-bank row-buffer model used for covert-channel analysis.
//!
//! One row buffer per bank. An access whose row matches the currently open
//! row is a hit; otherwise the bank's open row is replaced and the access is
//! a miss. Only load/store accesses reach this model — fetches never do.

/// Row-buffer state for the DRAM banks below the LLC.
pub struct DramBankModel {
    open_row: Vec<Option<u64>>,
    row_shift: u32,
}

impl DramBankModel {
    /// Creates a model with `num_banks` banks (at least 1), with row
    /// boundaries every `row_bytes` bytes (at least 1).
    #[must_use]
    pub fn new(num_banks: usize, row_bytes: u64) -> Self {
        Self {
            open_row: vec![None; num_banks.max(1)],
            row_shift: row_bytes.max(1).trailing_zeros(),
        }
    }

    fn bank_and_row(&self, addr: u64) -> (usize, u64) {
        let row = addr >> self.row_shift;
        let bank = (row as usize) % self.open_row.len();
        (bank, row)
    }

    /// Accesses `addr`, returning whether it hit the currently open row.
    pub fn access(&mut self, addr: u64) -> bool {
        let (bank, row) = self.bank_and_row(addr);
        let hit = self.open_row[bank] == Some(row);
        self.open_row[bank] = Some(row);
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::DramBankModel;

    #[test]
    fn first_access_to_a_bank_is_always_a_miss() {
        let mut dram = DramBankModel::new(8, 2048);
        assert!(!dram.access(0));
    }

    #[test]
    fn repeated_access_to_the_same_row_hits() {
        let mut dram = DramBankModel::new(8, 2048);
        dram.access(0x1000);
        assert!(dram.access(0x1000));
        assert!(dram.access(0x1000 + 4));
    }

    #[test]
    fn a_different_row_in_the_same_bank_reopens_it() {
        let mut dram = DramBankModel::new(1, 2048);
        dram.access(0x1000);
        assert!(!dram.access(0x2000));
        assert!(!dram.access(0x1000));
    }
}
