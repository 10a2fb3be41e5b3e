use log::debug;

use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::{Button, Input},
    ppu::Ppu,
    serial::Serial,
    timer::Timer,
};

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HRAM_SIZE: usize = 0x7F;
const OAM_DMA_LEN: u16 = 0xA0;

pub struct Mmu {
    pub wram: [[u8; WRAM_BANK_SIZE]; WRAM_BANKS],
    pub wram_bank: usize,
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    pub boot_rom_finished: bool,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    pub key1: u8,
    hdma_src: u16,
    hdma_dst: u16,
    cgb: bool,
}

impl Mmu {
    pub fn new_with_mode(cgb: bool) -> Self {
        Self {
            wram: [[0; WRAM_BANK_SIZE]; WRAM_BANKS],
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            cart: None,
            boot_rom: None,
            boot_rom_finished: true,
            if_reg: 0xE1,
            ie_reg: 0,
            serial: Serial::new(),
            ppu: Ppu::new_with_mode(cgb),
            apu: Apu::new_with_mode(cgb),
            timer: Timer::new(),
            input: Input::new(),
            key1: 0,
            hdma_src: 0,
            hdma_dst: 0,
            cgb,
        }
    }

    pub fn new() -> Self {
        Self::new_with_mode(false)
    }

    #[inline]
    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    #[inline]
    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    /// Installs a boot ROM image and maps it over low ROM until the guest
    /// writes 0xFF50.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_rom_finished = false;
    }

    pub fn button_press(&mut self, button: Button) {
        if self.input.press(button) {
            self.if_reg |= 0x10;
        }
    }

    pub fn button_release(&mut self, button: Button) {
        self.input.release(button);
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    fn boot_rom_byte(&self, addr: u16) -> u8 {
        self.boot_rom
            .as_ref()
            .and_then(|b| b.get(addr as usize).copied())
            .unwrap_or(0xFF)
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        match addr {
            // The boot ROM overlays low ROM until handoff. On CGB the
            // image also covers 0x0200-0x08FF, leaving the cartridge
            // header visible in between.
            0x0000..=0x00FF if !self.boot_rom_finished => self.boot_rom_byte(addr),
            0x0200..=0x08FF if !self.boot_rom_finished && self.cgb => self.boot_rom_byte(addr),
            0x0000..=0x7FFF => self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF),
            0x8000..=0x9FFF => self.ppu.vram[self.ppu.vram_bank][(addr - 0x8000) as usize],
            0xA000..=0xBFFF => self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF),
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize],
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize],
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0x00,
            0xFF00 => self.input.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B | 0xFF68..=0xFF6B => self.ppu.read_reg(addr),
            0xFF46 => self.ppu.dma,
            0xFF4D => {
                if self.cgb {
                    (self.key1 & 0x81) | 0x7E
                } else {
                    0xFF
                }
            }
            0xFF4F => {
                if self.cgb {
                    self.ppu.vram_bank as u8 | 0xFE
                } else {
                    0xFF
                }
            }
            0xFF50 => {
                if self.boot_rom_finished {
                    0xFF
                } else {
                    0xFE
                }
            }
            0xFF51 => {
                if self.cgb {
                    (self.hdma_src >> 8) as u8
                } else {
                    0xFF
                }
            }
            0xFF52 => {
                if self.cgb {
                    (self.hdma_src & 0x00F0) as u8
                } else {
                    0xFF
                }
            }
            0xFF53 => {
                if self.cgb {
                    ((self.hdma_dst >> 8) & 0x1F) as u8
                } else {
                    0xFF
                }
            }
            0xFF54 => {
                if self.cgb {
                    (self.hdma_dst & 0x00F0) as u8
                } else {
                    0xFF
                }
            }
            // VRAM DMA runs to completion inside the trigger write, so the
            // status port always reads idle.
            0xFF55 => 0xFF,
            0xFF70 => {
                if self.cgb {
                    self.wram_bank as u8 | 0xF8
                } else {
                    0xFF
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                self.ppu.vram[self.ppu.vram_bank][(addr - 0x8000) as usize] = val;
            }
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize] = val,
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize] = val,
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B | 0xFF68..=0xFF6B => {
                self.ppu.write_reg(addr, val, &mut self.if_reg);
            }
            0xFF46 => self.oam_dma(val),
            0xFF4D => {
                if self.cgb {
                    self.key1 = (self.key1 & 0x80) | (val & 0x01);
                }
            }
            0xFF4F => {
                if self.cgb {
                    self.ppu.vram_bank = (val & 0x01) as usize;
                }
            }
            0xFF50 => {
                if !self.boot_rom_finished && val & 0x01 != 0 {
                    self.boot_rom_finished = true;
                }
            }
            0xFF51 => {
                if self.cgb {
                    self.hdma_src = ((val as u16) << 8) | (self.hdma_src & 0x00FF);
                }
            }
            0xFF52 => {
                if self.cgb {
                    self.hdma_src = (self.hdma_src & 0xFF00) | (val & 0xF0) as u16;
                }
            }
            0xFF53 => {
                if self.cgb {
                    self.hdma_dst = (((val & 0x1F) as u16) << 8) | (self.hdma_dst & 0x00F0);
                }
            }
            0xFF54 => {
                if self.cgb {
                    self.hdma_dst = (self.hdma_dst & 0x1F00) | (val & 0xF0) as u16;
                }
            }
            0xFF55 => {
                if self.cgb {
                    self.vram_dma(val);
                }
            }
            0xFF70 => {
                if self.cgb {
                    let bank = (val & 0x07) as usize;
                    self.wram_bank = if bank == 0 { 1 } else { bank };
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {
                debug!("write to unmapped I/O {addr:04X} <- {val:02X} discarded");
            }
        }
    }

    /// One-shot OAM DMA: copy 160 bytes from `val << 8` into OAM.
    fn oam_dma(&mut self, val: u8) {
        self.ppu.dma = val;
        let src = (val as u16) << 8;
        for i in 0..OAM_DMA_LEN {
            // Sources above the echo region fold back onto WRAM.
            let mut addr = src.wrapping_add(i);
            if addr >= 0xFE00 {
                addr = addr.wrapping_sub(0x2000);
            }
            let byte = self.read_byte(addr);
            self.ppu.oam[i as usize] = byte;
        }
    }

    /// CGB VRAM DMA. Both the general-purpose and H-blank forms are
    /// performed as an immediate burst of `(len + 1) * 0x10` bytes.
    fn vram_dma(&mut self, val: u8) {
        let blocks = (val & 0x7F) as u16 + 1;
        let mut src = self.hdma_src & 0xFFF0;
        let mut dst = 0x8000 | (self.hdma_dst & 0x1FF0);
        for _ in 0..blocks * 0x10 {
            let byte = self.read_byte(src);
            self.ppu.vram[self.ppu.vram_bank][(dst - 0x8000) as usize] = byte;
            src = src.wrapping_add(1);
            dst = 0x8000 | ((dst.wrapping_add(1)) & 0x1FFF);
        }
        self.hdma_src = src;
        self.hdma_dst = dst & 0x1FF0;
    }

    pub fn reset_div(&mut self) {
        self.timer.reset_div(&mut self.if_reg);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
