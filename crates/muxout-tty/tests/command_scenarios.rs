//! End-to-end command scenarios: literal inputs against capability
//! profiles, with the emitted bytes replayed into the reference
//! terminal model where the observable outcome matters.

use std::rc::Rc;

use muxout_term::{Cap, TermCaps};
use muxout_tty::cell::{Attrs, GridCell};
use muxout_tty::colour::Colour;
use muxout_tty::commands::{Client, ScreenCommand, TtyCtx, write};
use muxout_tty::screen::{Pane, Window};
use muxout_tty::terminal_model::TerminalModel;
use muxout_tty::tty::{Tty, TtyError, TtyFlags};

fn tty(term: TermCaps) -> Tty<Vec<u8>> {
    let mut t = Tty::headless(Vec::new(), term, 80, 24);
    t.set_flags(TtyFlags::UTF8);
    t
}

fn pane(sx: u16, sy: u16) -> Pane {
    Pane::new(1, Rc::new(Window::new(1)), sx, sy)
}

/// Final bytes of every CSI sequence in the stream.
fn csi_finals(bytes: &[u8]) -> Vec<u8> {
    let mut finals = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'[') {
            i += 2;
            while i < bytes.len() && !(0x40..=0x7e).contains(&bytes[i]) {
                i += 1;
            }
            if i < bytes.len() {
                finals.push(bytes[i]);
            }
        }
        i += 1;
    }
    finals
}

// ── Single-operation scenarios ─────────────────────────────────────────

#[test]
fn single_char_with_active_default_cell_is_one_byte() {
    let mut t = tty(TermCaps::xterm_256color());
    t.cursor_to(0, 0);
    t.take_output();

    t.put_cell(&GridCell::from_char('a'), None);
    assert_eq!(t.take_output(), b"a");
    assert_eq!(t.cursor(), Some((1, 0)));
}

#[test]
fn cursor_to_origin_uses_home() {
    let mut t = tty(TermCaps::xterm_256color());
    t.cursor_to(10, 5);
    t.take_output();

    t.cursor_to(0, 0);
    assert_eq!(t.take_output(), b"\x1b[H");
    assert_eq!(t.cursor(), Some((0, 0)));
}

#[test]
fn linefeed_at_region_bottom_scrolls_the_reference_terminal() {
    let mut t = tty(TermCaps::xterm_256color());
    let mut p = pane(80, 24);
    p.screen.put_str(0, 0, "first");

    let mut ctx = TtyCtx::new(&p);
    ctx.ocx = 0;
    ctx.ocy = 23;
    ctx.orupper = 0;
    ctx.orlower = 23;

    let mut model = TerminalModel::new(80, 24);
    model.process(b"first");
    assert_eq!(model.row_text(0), "first");

    t.write_command(ScreenCommand::LineFeed, &ctx);
    model.process(&t.take_output());

    // The region scrolled: row 0 content is gone, cursor sits at the
    // bottom of the region, which is unchanged.
    assert_eq!(model.row_text(0), "");
    assert_eq!(model.cursor(), (0, 23));
    assert_eq!(t.cursor(), Some((0, 23)));
    assert_eq!(t.scroll_region(), Some((0, 23)));
}

#[test]
fn palette_256_downgrade_to_8_colours_adds_bright() {
    let mut t = tty(TermCaps::xterm());
    t.attributes(&GridCell::DEFAULT.with_fg(Colour::Palette(196)), None);
    let bytes = t.take_output();
    assert_eq!(bytes, b"\x1b[31m\x1b[1m");
    assert_eq!(t.shadow_cell().fg, Colour::Base(1));
    assert!(t.shadow_cell().attr.contains(Attrs::BRIGHT));
}

#[test]
fn insertcharacter_on_narrow_pane_redraws_instead_of_ich() {
    let mut t = tty(TermCaps::xterm_256color());
    let mut p = pane(40, 24);
    p.screen.put_str(0, 7, "0123456789");
    let mut ctx = TtyCtx::new(&p);
    ctx.ocy = 7;
    ctx.num = 3;

    t.write_command(ScreenCommand::InsertCharacter, &ctx);
    let bytes = t.take_output();
    assert!(
        !csi_finals(&bytes).contains(&b'@'),
        "ICH emitted for a half-width pane"
    );

    let mut model = TerminalModel::new(80, 24);
    model.process(&bytes);
    assert!(model.row_text(7).starts_with("0123456789"));
}

#[test]
fn reverse_video_substitutes_for_missing_setab() {
    let mut t = tty(TermCaps::vt100());
    t.attributes(
        &GridCell::DEFAULT.with_fg(Colour::Base(7)).with_bg(Colour::Base(4)),
        None,
    );
    assert!(t.shadow_cell().attr.contains(Attrs::REVERSE));

    let mut model = TerminalModel::new(80, 24);
    model.process(&t.take_output());
    assert!(model.sgr().attrs.contains(Attrs::REVERSE));

    t.attributes(&GridCell::DEFAULT.with_bg(Colour::Default), None);
    model.process(&t.take_output());
    assert!(!model.sgr().attrs.contains(Attrs::REVERSE));
}

// ── fake-BCE soundness ─────────────────────────────────────────────────

#[test]
fn fake_bce_commands_never_emit_bulk_erase_primitives() {
    // screen has no BCE; a styled pane background makes every bulk
    // erase unsafe.
    let commands = [
        ScreenCommand::InsertCharacter,
        ScreenCommand::DeleteCharacter,
        ScreenCommand::ClearCharacter,
        ScreenCommand::InsertLine,
        ScreenCommand::DeleteLine,
        ScreenCommand::ClearLine,
        ScreenCommand::ClearEndOfLine,
        ScreenCommand::ClearStartOfLine,
        ScreenCommand::ReverseIndex,
        ScreenCommand::LineFeed,
        ScreenCommand::ClearEndOfScreen,
        ScreenCommand::ClearStartOfScreen,
        ScreenCommand::ClearScreen,
    ];

    for cmd in commands {
        let mut t = tty(TermCaps::screen_256color());
        let mut p = pane(80, 24);
        p.style = GridCell::DEFAULT.with_bg(Colour::Base(4));

        let mut ctx = TtyCtx::new(&p);
        ctx.ocx = 1;
        ctx.num = 1;
        ctx.orupper = 2;
        ctx.orlower = 5;
        ctx.ocy = match cmd {
            ScreenCommand::ReverseIndex => 2,
            ScreenCommand::LineFeed => 5,
            _ => 3,
        };

        t.write_command(cmd, &ctx);
        let bytes = t.take_output();

        for final_byte in csi_finals(&bytes) {
            assert!(
                !matches!(final_byte, b'K' | b'J' | b'X' | b'@' | b'P' | b'L' | b'M'),
                "{cmd:?} emitted CSI final {:?} under fake BCE: {:?}",
                final_byte as char,
                String::from_utf8_lossy(&bytes)
            );
        }
        assert!(
            !bytes.windows(2).any(|w| w == b"\x1bM"),
            "{cmd:?} emitted RI under fake BCE"
        );
    }
}

// ── wrap preservation ──────────────────────────────────────────────────

#[test]
fn successive_wrapped_lines_render_without_repositioning() {
    let mut t = tty(TermCaps::xterm_256color());
    let mut model = TerminalModel::new(80, 24);

    let mut p = pane(80, 24);
    let long: String = "x".repeat(80);
    p.screen.put_str(0, 0, &long);
    p.screen.set_wrapped(0, true);
    p.screen.put_str(0, 1, "tail");

    t.region_set(0, 23);
    model.process(&t.take_output());

    t.draw_pane(&p, 0, 0, 0);
    model.process(&t.take_output());
    assert_eq!(t.cursor(), Some((80, 0)), "row 0 must end pending wrap");

    t.draw_pane(&p, 1, 0, 0);
    let second = t.take_output();
    let finals = csi_finals(&second);
    assert!(
        !finals.iter().any(|f| matches!(f, b'H' | b'G' | b'd' | b'A' | b'B' | b'C' | b'D')),
        "cursor repositioned despite natural wrap: {:?}",
        String::from_utf8_lossy(&second)
    );

    model.process(&second);
    assert_eq!(model.row_text(0), long);
    assert!(model.row_text(1).starts_with("tail"));
    assert_eq!(Some(model.cursor()), t.cursor());
}

// ── multi-client fan-out ───────────────────────────────────────────────

#[test]
fn clients_with_different_status_lines_place_content_differently() {
    let p = pane(80, 23);

    let mut clients = vec![
        Client::new(tty(TermCaps::xterm_256color())),
        Client::new(tty(TermCaps::xterm_256color())),
    ];
    clients[0].current_window = Some(1);
    clients[1].current_window = Some(1);
    clients[1].status_at_top = true;

    let mut ctx = TtyCtx::new(&p);
    ctx.cell = GridCell::from_char('x');
    write(&mut clients, ScreenCommand::Cell, &mut ctx);

    let mut model_a = TerminalModel::new(80, 24);
    let mut model_b = TerminalModel::new(80, 24);
    model_a.process(&clients[0].tty.take_output());
    model_b.process(&clients[1].tty.take_output());

    assert_eq!(model_a.cell(0, 0).ch, 'x');
    assert_eq!(model_b.cell(0, 0).ch, ' ');
    assert_eq!(model_b.cell(0, 1).ch, 'x');
}

// ── lifecycle errors ───────────────────────────────────────────────────

#[test]
fn open_surfaces_unknown_terminals() {
    let mut t = Tty::headless(Vec::new(), TermCaps::empty("paper-teletype"), 80, 24);
    match t.open() {
        Err(TtyError::Term(_)) => {}
        other => panic!("expected unknown-terminal error, got {other:?}"),
    }
    assert!(!t.flags().contains(TtyFlags::OPENED));
}

#[test]
fn open_rejects_terminals_missing_required_caps() {
    let mut t = Tty::headless(Vec::new(), TermCaps::empty("dumb"), 80, 24);
    assert!(t.open().is_err());
}

#[test]
fn open_resolves_and_starts_known_terminals() {
    let mut t = Tty::headless(Vec::new(), TermCaps::empty("xterm-256color"), 80, 24);
    t.open().unwrap();
    assert!(t.flags().contains(TtyFlags::STARTED));
    assert!(t.term.has(Cap::Csr));
    let bytes = t.take_output();
    assert!(bytes.starts_with(b"\x1b[?1049h"));
}
