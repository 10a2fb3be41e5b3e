use log::debug;
use thiserror::Error;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_LEN: usize = 0x150;

const TITLE_OFFSET: usize = 0x134;
const TITLE_END: usize = 0x143;
const CGB_FLAG_OFFSET: usize = 0x143;
const CART_TYPE_OFFSET: usize = 0x147;
const RAM_SIZE_OFFSET: usize = 0x149;

/// MBC3 RTC runs off the system clock when emulated.
const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image is too small to contain a header ({0} bytes)")]
    RomTooSmall(usize),

    #[error("unknown cartridge type byte {0:#04X}")]
    UnknownCartType(u8),

    #[error("unknown RAM size byte {0:#04X}")]
    UnknownRamSize(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Per-mapper register state. The variant is selected once at load time so
/// the read/write hot paths dispatch on a stable discriminant.
#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        /// RAM bank select or RTC register select (0x08-0x0C).
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 real-time clock, advanced from the emulated clock rather than wall
/// time so results are deterministic and persistence stays the host's
/// concern.
#[derive(Debug, Default)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = val & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.regs.minutes = val & 0x3F,
            0x0A => self.regs.hours = val & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | val as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((val & 0x01) as u16) << 8);
                self.regs.halt = val & 0x40 != 0;
                self.regs.carry = val & 0x80 != 0;
            }
            _ => {}
        }
        self.latch();
    }

    fn step(&mut self, cycles: u32) {
        if self.regs.halt {
            return;
        }
        self.subsecond_cycles += cycles;
        while self.subsecond_cycles >= RTC_CYCLES_PER_SECOND {
            self.subsecond_cycles -= RTC_CYCLES_PER_SECOND;
            self.advance_second();
        }
    }

    fn advance_second(&mut self) {
        self.regs.seconds = (self.regs.seconds + 1) & 0x3F;
        if self.regs.seconds != 60 {
            return;
        }
        self.regs.seconds = 0;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if self.regs.minutes != 60 {
            return;
        }
        self.regs.minutes = 0;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if self.regs.hours != 24 {
            return;
        }
        self.regs.hours = 0;
        if self.regs.days == 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }
}

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub cgb: bool,
    pub title: String,
    cart_type: u8,
    mbc_state: MbcState,
    rumble_wired: bool,
    rumble_active: bool,
    rumble_callback: Option<Box<dyn FnMut(bool)>>,
}

impl std::fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartridge")
            .field("title", &self.title)
            .field("mbc", &self.mbc)
            .field("cgb", &self.cgb)
            .field("rom_len", &self.rom.len())
            .field("ram_len", &self.ram.len())
            .finish_non_exhaustive()
    }
}

impl Cartridge {
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;
        let ram_size = header.ram_size()?;
        let cgb = header.cgb_supported();
        let title = header.title();
        let rumble_wired = matches!(cart_type, 0x1C..=0x1E);

        let mbc_state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(Rtc::default),
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        debug!(
            "loaded cartridge \"{}\" (mbc: {:?}, cgb: {}, ram: {} bytes)",
            title, mbc, cgb, ram_size
        );

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            cgb,
            title,
            cart_type,
            mbc_state,
            rumble_wired,
            rumble_active: false,
            rumble_callback: None,
        })
    }

    /// Installs the host's rumble line callback. Invoked synchronously from
    /// MBC5 register writes, on edges only.
    pub fn set_rumble_callback(&mut self, callback: Box<dyn FnMut(bool)>) {
        self.rumble_callback = Some(callback);
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    /// Raw battery-backed RAM (the 512-nibble on-chip RAM for MBC2).
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Overwrites save RAM with host-provided bytes; extra bytes are
    /// ignored, missing bytes leave the tail untouched.
    pub fn set_ram(&mut self, bytes: &[u8]) {
        for (dst, src) in self.ram.iter_mut().zip(bytes.iter()) {
            *dst = *src;
        }
    }

    /// Advance the RTC, if this cartridge has one, by `cycles` CPU cycles.
    pub fn step_rtc(&mut self, cycles: u16) {
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc_state {
            rtc.step(cycles as u32);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / ROM_BANK_SIZE).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::RomOnly, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // Mode 1 maps the upper bank bits into the low ROM window.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                let offset = bank * ROM_BANK_SIZE + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank %= rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize & 0x0F).max(1) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize).max(1) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                // MBC5 maps bank 0 here when selected; no zero coercion.
                let bank = (*rom_bank as usize) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::RomOnly, 0xA000..=0xBFFF) => self
                .ram
                .get(addr as usize - 0xA000)
                .copied()
                .unwrap_or(0xFF),
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512x4-bit built-in RAM, mirrored across the window;
                    // the upper nibble is unwired.
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    0xF0 | (self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F)
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = self.mbc1_ram_index(addr);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x07 => {
                            let idx =
                                (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                            self.ram.get(idx).copied().unwrap_or(0xFF)
                        }
                        0x08..=0x0C => rtc
                            .as_ref()
                            .map(|r| r.read_latched(*ram_bank))
                            .unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            (
                MbcState::Mbc5 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::RomOnly, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.mbc1_ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects the register: clear for RAM enable,
                // set for the 4-bit ROM bank.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                // RTC latch on a 0x00 -> 0x01 write sequence.
                if val == 0 {
                    *latch_pending = true;
                } else {
                    if val == 1 && *latch_pending {
                        if let Some(rtc) = rtc {
                            rtc.latch();
                        }
                    }
                    *latch_pending = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x07 => {
                            let idx =
                                (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(*ram_bank, val);
                            }
                        }
                        _ => {}
                    }
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                if self.rumble_wired {
                    *ram_bank = val & 0x07;
                    let line = val & 0x08 != 0;
                    if line != self.rumble_active {
                        self.rumble_active = line;
                        if let Some(cb) = self.rumble_callback.as_mut() {
                            cb(line);
                        }
                    }
                } else {
                    *ram_bank = val & 0x0F;
                }
            }
            (
                MbcState::Mbc5 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    let idx = (*ram_bank as usize) * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn mbc1_ram_index(&self, addr: u16) -> usize {
        let ram_bank_count = self.ram.len() / RAM_BANK_SIZE;
        match &self.mbc_state {
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                if *mode == 0 || ram_bank_count == 0 {
                    addr as usize - 0xA000
                } else {
                    let bank = (*ram_bank as usize) % ram_bank_count;
                    bank * RAM_BANK_SIZE + (addr as usize - 0xA000)
                }
            }
            _ => addr as usize - 0xA000,
        }
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_LEN {
            return Err(CartridgeError::RomTooSmall(data.len()));
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[TITLE_OFFSET..TITLE_END];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.data[CGB_FLAG_OFFSET] & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.data[CART_TYPE_OFFSET]
    }

    fn has_rtc(&self) -> bool {
        matches!(self.cart_type(), 0x0F | 0x10)
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::RomOnly),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnknownCartType(other)),
        }
    }

    fn ram_size(&self) -> Result<usize, CartridgeError> {
        // MBC2 carries its 512x4-bit RAM on-chip regardless of the header
        // RAM size byte.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return Ok(0x200);
        }
        match self.data[RAM_SIZE_OFFSET] {
            0x00 | 0x01 => Ok(0),
            0x02 => Ok(RAM_BANK_SIZE),
            0x03 => Ok(4 * RAM_BANK_SIZE),
            0x04 => Ok(16 * RAM_BANK_SIZE),
            0x05 => Ok(8 * RAM_BANK_SIZE),
            other => Err(CartridgeError::UnknownRamSize(other)),
        }
    }
}
