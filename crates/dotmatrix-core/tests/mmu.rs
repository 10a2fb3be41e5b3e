mod common;

use dotmatrix_core::cartridge::Cartridge;
use dotmatrix_core::mmu::Mmu;

#[test]
fn wram_echo_mirrors_writes() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xC000, 0xAA);
    assert_eq!(mmu.read_byte(0xE000), 0xAA);
    mmu.write_byte(0xE001, 0xBB);
    assert_eq!(mmu.read_byte(0xC001), 0xBB);
}

#[test]
fn cgb_wram_bank_zero_selects_one() {
    let mut mmu = Mmu::new_with_mode(true);
    mmu.write_byte(0xFF70, 0x02);
    mmu.write_byte(0xD000, 0x22);
    mmu.write_byte(0xFF70, 0x00); // 0 acts as 1
    mmu.write_byte(0xD000, 0x11);
    mmu.write_byte(0xFF70, 0x01);
    assert_eq!(mmu.read_byte(0xD000), 0x11);
    mmu.write_byte(0xFF70, 0x02);
    assert_eq!(mmu.read_byte(0xD000), 0x22);
    assert_eq!(mmu.read_byte(0xFF70) & 0xF8, 0xF8);
}

#[test]
fn cgb_vram_banking() {
    let mut mmu = Mmu::new_with_mode(true);
    mmu.write_byte(0x8000, 0x11);
    mmu.write_byte(0xFF4F, 0x01);
    assert_eq!(mmu.read_byte(0x8000), 0x00);
    mmu.write_byte(0x8000, 0x22);
    mmu.write_byte(0xFF4F, 0x00);
    assert_eq!(mmu.read_byte(0x8000), 0x11);
}

#[test]
fn dmg_has_no_banked_io() {
    let mut mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0xFF4F), 0xFF);
    assert_eq!(mmu.read_byte(0xFF70), 0xFF);
    assert_eq!(mmu.read_byte(0xFF4D), 0xFF);
}

#[test]
fn boot_rom_overlay_and_handoff() {
    let mut mmu = Mmu::new();
    let cart = Cartridge::load(common::rom_with_code(&[])).unwrap();
    mmu.load_cart(cart);
    mmu.load_boot_rom(vec![0xAA; 0x100]);

    assert_eq!(mmu.read_byte(0x0000), 0xAA);
    mmu.write_byte(0xFF50, 0x01);
    assert_eq!(mmu.read_byte(0x0000), 0x00);
    // The handoff is one-way; clearing the bit does not re-map.
    mmu.write_byte(0xFF50, 0x00);
    assert_eq!(mmu.read_byte(0x0000), 0x00);
}

#[test]
fn cgb_boot_rom_leaves_header_window() {
    let mut rom = common::rom_with_code(&[]);
    rom[0x0143] = 0x80; // CGB cartridge
    rom[0x0100] = 0xC2;
    rom[0x01FF] = 0xC3;
    let cart = Cartridge::load(rom).unwrap();

    let mut mmu = Mmu::new_with_mode(true);
    mmu.load_cart(cart);
    let mut boot = vec![0u8; 0x900];
    boot[0x0000] = 0xA0;
    boot[0x0200] = 0xA4;
    boot[0x08FF] = 0xA5;
    mmu.load_boot_rom(boot);

    assert_eq!(mmu.read_byte(0x0000), 0xA0);
    // 0x0100-0x01FF stays mapped to the cartridge header.
    assert_eq!(mmu.read_byte(0x0100), 0xC2);
    assert_eq!(mmu.read_byte(0x01FF), 0xC3);
    assert_eq!(mmu.read_byte(0x0200), 0xA4);
    assert_eq!(mmu.read_byte(0x08FF), 0xA5);
}

#[test]
fn oam_dma_copies_from_wram() {
    let mut mmu = Mmu::new();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC000 + i, i as u8);
    }
    mmu.write_byte(0xFF46, 0xC0);
    for i in 0..0xA0usize {
        assert_eq!(mmu.ppu.oam[i], i as u8);
    }
    assert_eq!(mmu.read_byte(0xFF46), 0xC0);
}

#[test]
fn oam_dma_high_source_folds_to_wram() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xDE00, 0x5A);
    mmu.write_byte(0xFF46, 0xFE);
    assert_eq!(mmu.ppu.oam[0], 0x5A);
}

#[test]
fn cgb_vram_dma_bursts_into_vram() {
    let mut mmu = Mmu::new_with_mode(true);
    for i in 0..0x20u16 {
        mmu.write_byte(0xC000 + i, 0x80 | i as u8);
    }
    mmu.write_byte(0xFF51, 0xC0);
    mmu.write_byte(0xFF52, 0x00);
    mmu.write_byte(0xFF53, 0x00);
    mmu.write_byte(0xFF54, 0x40);
    mmu.write_byte(0xFF55, 0x01); // two 0x10-byte blocks, general purpose
    for i in 0..0x20u16 {
        assert_eq!(mmu.read_byte(0x8040 + i), 0x80 | i as u8);
    }
    assert_eq!(mmu.read_byte(0xFF55), 0xFF);
}

#[test]
fn unusable_region_reads_zero() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFEA0, 0x12);
    assert_eq!(mmu.read_byte(0xFEA0), 0x00);
    assert_eq!(mmu.read_byte(0xFEFF), 0x00);
}

#[test]
fn unmapped_io_reads_open_bus() {
    let mut mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0xFF03), 0xFF);
    assert_eq!(mmu.read_byte(0xFF08), 0xFF);
    assert_eq!(mmu.read_byte(0xFF7F), 0xFF);
}

#[test]
fn interrupt_flag_upper_bits_read_high() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    assert_eq!(mmu.read_byte(0xFF0F), 0xE0);
    mmu.write_byte(0xFF0F, 0xFF);
    assert_eq!(mmu.read_byte(0xFF0F), 0xFF);
}

#[test]
fn div_write_resets_to_zero() {
    let mut mmu = Mmu::new();
    let mut if_reg = 0;
    mmu.timer.step(0x4000, &mut if_reg);
    assert_ne!(mmu.read_byte(0xFF04), 0);
    mmu.write_byte(0xFF04, 0x5A);
    assert_eq!(mmu.read_byte(0xFF04), 0);
}

#[test]
fn joyp_selects_button_rows() {
    let mut mmu = Mmu::new();
    mmu.button_press(dotmatrix_core::Button::Start);
    assert_eq!(mmu.if_reg & 0x10, 0x10, "press raises joypad interrupt");

    mmu.write_byte(0xFF00, 0x10); // select action row
    assert_eq!(mmu.read_byte(0xFF00), 0xC0 | 0x10 | 0x07);
    mmu.write_byte(0xFF00, 0x20); // select d-pad row
    assert_eq!(mmu.read_byte(0xFF00), 0xC0 | 0x20 | 0x0F);
}

#[test]
fn key1_arms_speed_switch_on_cgb_only() {
    let mut mmu = Mmu::new_with_mode(true);
    mmu.write_byte(0xFF4D, 0x01);
    assert_eq!(mmu.read_byte(0xFF4D), 0x7F); // armed, still single speed

    let mut dmg = Mmu::new();
    dmg.write_byte(0xFF4D, 0x01);
    assert_eq!(dmg.read_byte(0xFF4D), 0xFF);
}

#[test]
fn reads_without_cartridge_are_open_bus() {
    let mut mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0x0000), 0xFF);
    assert_eq!(mmu.read_byte(0x4000), 0xFF);
    assert_eq!(mmu.read_byte(0xA000), 0xFF);
}
