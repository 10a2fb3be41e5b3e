#![allow(dead_code)]

use dotmatrix_core::gameboy::GameBoy;

pub const ENTRY: u16 = 0x0150;

/// Builds a 32 KiB ROM-only image whose entry point jumps to `code` at
/// 0x0150, the conventional post-header location.
pub fn rom_with_code(code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x100] = 0xC3; // JP 0x0150
    rom[0x101] = (ENTRY & 0xFF) as u8;
    rom[0x102] = (ENTRY >> 8) as u8;
    rom[ENTRY as usize..ENTRY as usize + code.len()].copy_from_slice(code);
    rom
}

pub fn rom_with_header(code: &[u8], cart_type: u8, ram_size: u8) -> Vec<u8> {
    let mut rom = rom_with_code(code);
    rom[0x147] = cart_type;
    rom[0x149] = ram_size;
    rom
}

/// A DMG machine with `code` loaded and PC parked at the entry jump.
pub fn machine_with_code(code: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new();
    gb.load_rom(rom_with_code(code)).expect("synthetic ROM must load");
    gb
}

/// Executes `n` instruction steps (or interrupt dispatches).
pub fn step_instrs(gb: &mut GameBoy, n: usize) {
    for _ in 0..n {
        gb.cpu.step(&mut gb.mmu);
    }
}
