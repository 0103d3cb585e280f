use super::*;

pub(crate) fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, config: Config) -> Result<()> {
    let transport = Transport::from_config(&config).context("configure backend relay")?;
    let mut app = App::new(&config, transport);
    app.start_background(&config);

    const ACTIVE_POLL_MS: u64 = 33;
    const IDLE_POLL_MS: u64 = 100;
    const SPINNER_TICK_MS: u64 = 120;
    const STREAMING_DRAW_INTERVAL_MS: u64 = 33;
    const MAX_EVENTS_PER_FRAME: u16 = 64;
    let mut last_spinner_tick = Instant::now();
    let mut last_draw_at = Instant::now()
        .checked_sub(Duration::from_millis(STREAMING_DRAW_INTERVAL_MS))
        .unwrap_or_else(Instant::now);
    let mut needs_draw = true;

    loop {
        if app.poll_worker() {
            needs_draw = true;
        }
        if app.conversation.is_typing()
            && last_spinner_tick.elapsed() >= Duration::from_millis(SPINNER_TICK_MS)
        {
            app.spinner_idx = (app.spinner_idx + 1) % 8;
            last_spinner_tick = Instant::now();
            needs_draw = true;
        }

        if let Some(seq) = app.pending_clipboard.take() {
            crossterm::execute!(std::io::stdout(), crossterm::style::Print(seq))
                .context("write clipboard sequence")?;
        }

        if needs_draw {
            if app.conversation.is_streaming()
                && last_draw_at.elapsed() < Duration::from_millis(STREAMING_DRAW_INTERVAL_MS)
            {
                // Hold briefly to batch incoming chunks.
            } else {
                if let Ok(area) = terminal.size() {
                    app.update_viewport(area.width, area.height);
                }
                app.ensure_render_cache();
                terminal.draw(|f| ui::draw(f, &app))?;
                last_draw_at = Instant::now();
                needs_draw = false;
            }
        }

        if app.should_quit {
            break;
        }

        let timeout = if app.conversation.is_typing() || needs_draw {
            Duration::from_millis(ACTIVE_POLL_MS)
        } else {
            Duration::from_millis(IDLE_POLL_MS)
        };
        if !event::poll(timeout).context("event poll")? {
            continue;
        }

        let mut wheel_delta: i32 = 0;
        let mut drained_events: u16 = 0;

        loop {
            match event::read().context("event read")? {
                Event::Key(key) => {
                    if !matches!(key.kind, KeyEventKind::Release) {
                        app.handle_key(key);
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => wheel_delta -= 1,
                    MouseEventKind::ScrollDown => wheel_delta += 1,
                    _ => {}
                },
                Event::Paste(text) => app.handle_paste_event(&text),
                _ => {}
            }

            drained_events = drained_events.saturating_add(1);
            if drained_events >= MAX_EVENTS_PER_FRAME {
                break;
            }
            if !event::poll(Duration::from_millis(0)).context("event poll drain")? {
                break;
            }
        }

        if wheel_delta < 0 {
            app.scroll_up(wheel_delta.unsigned_abs().min(64) as u16);
        } else if wheel_delta > 0 {
            app.scroll_down(wheel_delta.unsigned_abs().min(64) as u16);
        }
        needs_draw = true;
    }

    info!("localchat exiting");
    Ok(())
}

#[cfg(test)]
pub(super) fn flatten_lines_to_plain(lines: &[Line<'static>]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
        .collect()
}
