use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use beatpad::pad::PadCategory;

use crate::app::App;

// ── Top-level routing ─────────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, app: &App) {
    let grid_height = app.pads.len() as u16 + 4;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),           // title bar  chunks[0]
            Constraint::Length(grid_height), // pad grid   chunks[1]
            Constraint::Length(4),           // status     chunks[2]
            Constraint::Min(0),              // help       chunks[3]
        ])
        .split(f.area());

    draw_title(f, chunks[0], app);
    draw_grid(f, chunks[1], app);
    draw_status(f, chunks[2], app);
    draw_help(f, chunks[3]);
}

// ── Title bar ─────────────────────────────────────────────────────────────────

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let play_ind = if app.transport.is_playing() { "  ▶PLAY" } else { "" };
    let text = format!("  beatpad  ─  Kit: {}{}  ─  [{}]", app.kit_name, play_ind, app.audio);
    let color = if app.audio.is_ready() { Color::Cyan } else { Color::Yellow };
    f.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL)),
        area,
    );
}

// ── Pad grid ──────────────────────────────────────────────────────────────────

fn pad_color(category: PadCategory) -> Color {
    match category {
        PadCategory::Kick       => Color::Red,
        PadCategory::Snare      => Color::Yellow,
        PadCategory::HiHat      => Color::Cyan,
        PadCategory::OpenHat    => Color::Blue,
        PadCategory::Clap       => Color::Magenta,
        PadCategory::Tom        => Color::Green,
        PadCategory::Crash      => Color::LightCyan,
        PadCategory::Percussion => Color::LightGreen,
        PadCategory::Effect     => Color::LightMagenta,
    }
}

/// Cell glyph for a slot's velocity.
fn velocity_glyph(v: f32) -> &'static str {
    match (v * 100.0).round() as u32 {
        0       => "·",
        1..=33  => "░",
        34..=66 => "▒",
        67..=99 => "▓",
        _       => "█",
    }
}

fn draw_grid(f: &mut Frame, area: Rect, app: &App) {
    let pattern = &app.pattern;
    let num_steps = pattern.length_in_steps;
    let playing = app.transport.is_playing();
    let current_step = app.transport.current_step;

    let mut lines: Vec<Line> = Vec::new();

    let swing_pct = (pattern.swing_amount * 100.0).round() as u32;
    let (status_str, status_color) =
        if playing { ("▶ PLAYING", Color::Green) } else { ("■ STOPPED", Color::DarkGray) };
    lines.push(Line::from(vec![
        Span::styled("BPM: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:.0}", pattern.tempo_bpm), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Steps: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", num_steps), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(status_str, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled("Swing: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}%", swing_pct),
            if swing_pct > 0 {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            },
        ),
        Span::raw("  "),
        Span::styled("Master: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:.0}%", app.master_gain * 100.0), Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
    ]));

    {
        let mut s = vec![Span::styled("              ", Style::default())];
        for i in 0..num_steps {
            let is_ph = playing && i == current_step;
            let label = if i % 4 == 0 { format!("{:>2}", i + 1) } else { " .".to_string() };
            let sty = if is_ph { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
                      else     { Style::default().fg(Color::DarkGray) };
            if i > 0 && i % 4 == 0 {
                s.push(Span::raw(" "));
            }
            s.push(Span::styled(label, sty));
        }
        lines.push(Line::from(s));
    }

    for (row_idx, pad) in app.pads.iter().enumerate() {
        let is_selected = row_idx == app.pad_row;
        let muted = pattern.is_muted(&pad.id);
        let color = pad_color(pad.category);

        let mute_char = if muted { 'M' } else if app.is_flashing(&pad.id) { '●' } else { '·' };
        let name_style = if is_selected && !muted {
            Style::default().fg(color).add_modifier(Modifier::BOLD)
        } else if is_selected {
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD)
        } else if muted {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(color)
        };
        let vel_pct = pattern
            .velocity(&pad.id, app.step)
            .map(|v| (v * 100.0).round() as u32)
            .unwrap_or(0);
        let vel_style = if is_selected {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let mut row: Vec<Span> = vec![
            Span::styled(format!(" {:<5.5}", pad.id.as_str()), name_style),
            Span::styled("[", Style::default().fg(Color::DarkGray)),
            Span::styled(mute_char.to_string(), Style::default().fg(color)),
            Span::styled("]", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{:3}%", vel_pct), vel_style),
            Span::styled("│", Style::default().fg(Color::DarkGray)),
        ];

        for i in 0..num_steps {
            let active = pattern.is_active(&pad.id, i);
            let glyph = if active {
                velocity_glyph(pattern.velocity(&pad.id, i).unwrap_or(0.0))
            } else {
                "·"
            };
            let is_ph = playing && i == current_step;
            let is_cu = is_selected && i == app.step;

            let sty = if is_ph && is_cu {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else if is_ph {
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
            } else if is_cu {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else if active && !muted {
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            if i > 0 && i % 4 == 0 {
                row.push(Span::styled("┆", Style::default().fg(Color::DarkGray)));
            }
            row.push(Span::styled(format!("{} ", glyph), sty));
        }

        lines.push(Line::from(row));
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Pads ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        area,
    );
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let (pad_name, category) = app
        .selected_pad()
        .map(|p| (p.id.to_string(), p.category.name()))
        .unwrap_or_default();

    let text = vec![
        Line::from(vec![
            Span::styled("Pad: ",  Style::default().fg(Color::DarkGray)),
            Span::styled(pad_name, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" ({category})"), Style::default().fg(Color::DarkGray)),
            Span::raw("  │  "),
            Span::styled("Step: ", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{}", app.step + 1), Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(Span::styled(app.status_msg.as_str(), Style::default().fg(Color::Yellow))),
    ];

    f.render_widget(
        Paragraph::new(text)
            .block(Block::default().title(" Status ").borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        area,
    );
}

// ── Help panel ────────────────────────────────────────────────────────────────

fn draw_help(f: &mut Frame, area: Rect) {
    let w = Style::default().fg(Color::White);

    let transport = Line::from(vec![
        Span::styled("[Enter] ",   w), Span::raw("Play/Stop  │  "),
        Span::styled("[PgUp/Dn] ", w), Span::raw("BPM  │  "),
        Span::styled("[<>] ",      w), Span::raw("Swing  │  "),
        Span::styled("[]] ",       w), Span::raw("Steps  │  "),
        Span::styled("[+/_] ",     w), Span::raw("Master  │  "),
        Span::styled("[Esc] ",     w), Span::raw("Quit"),
    ]);
    let editing = Line::from(vec![
        Span::styled("[↑↓←→] ", w), Span::raw("Move  │  "),
        Span::styled("[Space] ", w), Span::raw("Toggle  │  "),
        Span::styled("[-=] ",    w), Span::raw("Velocity  │  "),
        Span::styled("[\\] ",    w), Span::raw("Mute  │  "),
        Span::styled("[Del] ",   w), Span::raw("Clear row  │  "),
        Span::styled("[e] ",     w), Span::raw("Euclidean  │  "),
        Span::styled("[1-9/a] ", w), Span::raw("Audition"),
    ]);

    f.render_widget(
        Paragraph::new(vec![transport, editing])
            .block(Block::default().title(" Help ").borders(Borders::ALL))
            .style(Style::default().fg(Color::DarkGray)),
        area,
    );
}
