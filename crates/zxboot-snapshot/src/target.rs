/// Where decoded memory goes.
pub trait LoadTarget {
    /// Page 128K RAM bank `bank` in at 0xC000.
    fn select_bank(&mut self, bank: u8);
    /// Store `bytes` starting at the CPU address `addr`. Never wraps past 0xFFFF.
    fn write(&mut self, addr: u16, bytes: &[u8]);
}

impl<T: LoadTarget + ?Sized> LoadTarget for &mut T {
    fn select_bank(&mut self, bank: u8) {
        <T as LoadTarget>::select_bank(&mut **self, bank)
    }

    fn write(&mut self, addr: u16, bytes: &[u8]) {
        <T as LoadTarget>::write(&mut **self, addr, bytes)
    }
}

impl<T: LoadTarget + ?Sized> LoadTarget for Box<T> {
    fn select_bank(&mut self, bank: u8) {
        <T as LoadTarget>::select_bank(&mut **self, bank)
    }

    fn write(&mut self, addr: u16, bytes: &[u8]) {
        <T as LoadTarget>::write(&mut **self, addr, bytes)
    }
}

/// Plain RAM model: 16K below 0x8000 fixed to bank 5, 0x8000 to bank 2, 0xC000 to the selected
/// bank. A 48K image never selects a bank and so sees flat memory.
#[derive(Clone)]
pub struct BankedMemory {
    banks: Vec<[u8; 0x4000]>,
    selected: u8,
}

impl Default for BankedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl BankedMemory {
    pub fn new() -> Self {
        Self {
            banks: vec![[0u8; 0x4000]; 8],
            selected: 0,
        }
    }

    pub fn selected_bank(&self) -> u8 {
        self.selected
    }

    pub fn bank(&self, bank: u8) -> &[u8] {
        &self.banks[usize::from(bank & 7)]
    }

    fn bank_for(&self, addr: u16) -> Option<usize> {
        match addr {
            0x0000..=0x3fff => None,
            0x4000..=0x7fff => Some(5),
            0x8000..=0xbfff => Some(2),
            _ => Some(usize::from(self.selected)),
        }
    }

    /// Byte at a CPU address with the current paging; ROM reads as zero.
    pub fn read(&self, addr: u16) -> u8 {
        self.bank_for(addr)
            .map_or(0, |bank| self.banks[bank][usize::from(addr & 0x3fff)])
    }

    /// The 48K view: 0x4000..=0xFFFF with the current paging.
    pub fn flat_ram(&self) -> Vec<u8> {
        (0x4000..=0xffffu16).map(|addr| self.read(addr)).collect()
    }
}

impl std::fmt::Debug for BankedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankedMemory")
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl LoadTarget for BankedMemory {
    fn select_bank(&mut self, bank: u8) {
        self.selected = bank & 7;
    }

    fn write(&mut self, addr: u16, bytes: &[u8]) {
        for (offset, &b) in bytes.iter().enumerate() {
            let Ok(offset) = u16::try_from(offset) else {
                break;
            };
            let Some(a) = addr.checked_add(offset) else {
                break;
            };
            if let Some(bank) = self.bank_for(a) {
                self.banks[bank][usize::from(a & 0x3fff)] = b;
            }
        }
    }
}
