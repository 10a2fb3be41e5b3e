#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Hardware model being emulated.
///
/// Selected from the cartridge header CGB flag at load time. Model-specific
/// behavior (banked VRAM/WRAM, color palettes, double-speed mode) keys off
/// this.
pub enum Model {
    #[default]
    Dmg,
    Cgb,
}

impl Model {
    #[inline]
    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }

    /// Size of the boot ROM image for this model. The CGB image is 2 KiB
    /// with a hole at 0x100-0x1FF where the cartridge header stays visible.
    pub const fn boot_rom_len(self) -> usize {
        match self {
            Model::Dmg => 0x100,
            Model::Cgb => 0x900,
        }
    }
}
