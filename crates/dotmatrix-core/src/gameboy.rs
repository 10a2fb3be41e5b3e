use crate::{
    cartridge::{Cartridge, CartridgeError},
    cpu::Cpu,
    hardware::Model,
    input::Button,
    mmu::Mmu,
};

/// The assembled machine and the host-facing surface of the crate.
///
/// A host owns one `GameBoy` per emulated unit, drives it with
/// [`GameBoy::step_cycles`], and samples the front framebuffer, audio rings
/// and battery RAM between calls. Nothing here blocks or spawns threads.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    model: Model,
    pending_rumble: Option<Box<dyn FnMut(bool)>>,
}

impl GameBoy {
    pub fn new() -> Self {
        Self::new_with_mode(false)
    }

    pub fn new_with_mode(cgb: bool) -> Self {
        let model = if cgb { Model::Cgb } else { Model::Dmg };
        Self {
            cpu: Cpu::new_with_mode(cgb),
            mmu: Mmu::new_with_mode(cgb),
            model,
            pending_rumble: None,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Restore the machine to its initial state. Buffers survive but their
    /// contents are cleared; the loaded cartridge is dropped.
    pub fn reset(&mut self) {
        let cgb = self.model.is_cgb();
        let boot = self.mmu.boot_rom.take();
        self.cpu = Cpu::new_with_mode(cgb);
        self.mmu = Mmu::new_with_mode(cgb);
        if let Some(boot) = boot {
            self.mmu.load_boot_rom(boot);
            self.cpu = Cpu::new_power_on(cgb);
        }
    }

    /// Parses the cartridge header, reconfigures the machine for the
    /// cartridge's hardware model and inserts it. On error no state
    /// changes.
    pub fn load_rom(&mut self, data: Vec<u8>) -> Result<(), CartridgeError> {
        let mut cart = Cartridge::load(data)?;
        if let Some(callback) = self.pending_rumble.take() {
            cart.set_rumble_callback(callback);
        }

        self.model = if cart.cgb { Model::Cgb } else { Model::Dmg };
        self.reset();
        self.mmu.load_cart(cart);
        Ok(())
    }

    /// Installs a boot ROM image; the CPU restarts at the reset vector.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        let expected = self.model.boot_rom_len();
        if data.len() != expected {
            log::warn!(
                "boot ROM is {} bytes, expected {} for {:?}",
                data.len(),
                expected,
                self.model
            );
        }
        self.cpu = Cpu::new_power_on(self.model.is_cgb());
        self.mmu.load_boot_rom(data);
    }

    /// Runs whole instructions until at least `cycles` T-cycles have
    /// elapsed. Returns `cycles - consumed`, which is zero or negative;
    /// carry it into the next call to keep long-run pacing exact.
    pub fn step_cycles(&mut self, cycles: i32) -> i32 {
        let mut remaining = cycles as i64;
        while remaining > 0 {
            remaining -= self.cpu.step(&mut self.mmu) as i64;
        }
        remaining as i32
    }

    /// Title string from the cartridge header; empty with no cartridge.
    pub fn rom_title(&self) -> &str {
        self.mmu.cart.as_ref().map(|c| c.title.as_str()).unwrap_or("")
    }

    /// True iff the inserted cartridge has battery-backed RAM.
    pub fn supports_saving(&self) -> bool {
        self.mmu
            .cart
            .as_ref()
            .map(|c| c.has_battery())
            .unwrap_or(false)
    }

    /// The raw save RAM of a battery-backed cartridge.
    pub fn battery_backed_ram(&self) -> Option<&[u8]> {
        let cart = self.mmu.cart.as_ref()?;
        cart.has_battery().then(|| cart.ram())
    }

    /// Copies host-provided bytes into save RAM.
    pub fn set_battery_backed_ram(&mut self, bytes: &[u8]) {
        if let Some(cart) = self.mmu.cart.as_mut() {
            cart.set_ram(bytes);
        }
    }

    /// 160x144 RGBA front buffer; stable until the next V-blank.
    pub fn pixels(&self) -> &[u8] {
        self.mmu.ppu.front_pixels()
    }

    pub fn button_press(&mut self, button: Button) {
        self.mmu.button_press(button);
    }

    pub fn button_release(&mut self, button: Button) {
        self.mmu.button_release(button);
    }

    /// Pops up to `dst.len()` samples of the left audio channel, returning
    /// the number written.
    pub fn read_left_audio_channel(&mut self, dst: &mut [f32]) -> usize {
        self.mmu.apu.read_left(dst)
    }

    pub fn read_right_audio_channel(&mut self, dst: &mut [f32]) -> usize {
        self.mmu.apu.read_right(dst)
    }

    /// Registers the host callback for the MBC5 rumble line. Applies to
    /// the current cartridge and any loaded later.
    pub fn set_rumble_callback(&mut self, callback: impl FnMut(bool) + 'static) {
        match self.mmu.cart.as_mut() {
            Some(cart) => cart.set_rumble_callback(Box::new(callback)),
            None => self.pending_rumble = Some(Box::new(callback)),
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
