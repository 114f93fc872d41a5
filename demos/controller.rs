use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use soundtouch_controller::{
    format_clock, Artwork, Controller, ControllerConfig, ControllerEvent, ControllerHandle,
    DeviceRecord, EventReceiver, Intent, NowPlayingSnapshot, SoundTouchError, VolumeLevel,
    MAX_VOLUME,
};
use std::io;

const LOG_FILE: &str = "soundtouch-controller.log";
const VOLUME_STEP: VolumeLevel = 5;

#[derive(PartialEq)]
enum InputMode {
    Normal,
    AddDevice,
}

struct App {
    handle: ControllerHandle,
    devices: Vec<String>,
    selected_index: usize,
    connected: Option<DeviceRecord>,
    now_playing: Option<NowPlayingSnapshot>,
    volume: Option<VolumeLevel>,
    artwork: Option<Artwork>,
    status_message: String,
    alert: Option<String>,
    input_mode: InputMode,
    input: String,
}

impl App {
    fn new(handle: ControllerHandle) -> Self {
        Self {
            handle,
            devices: Vec::new(),
            selected_index: 0,
            connected: None,
            now_playing: None,
            volume: None,
            artwork: None,
            status_message: "Loading saved devices...".to_string(),
            alert: None,
            input_mode: InputMode::Normal,
            input: String::new(),
        }
    }

    fn select_next(&mut self) {
        if !self.devices.is_empty() {
            self.selected_index = (self.selected_index + 1) % self.devices.len();
        }
    }

    fn select_previous(&mut self) {
        if !self.devices.is_empty() {
            if self.selected_index == 0 {
                self.selected_index = self.devices.len() - 1;
            } else {
                self.selected_index -= 1;
            }
        }
    }

    fn selected_device(&self) -> Option<String> {
        self.devices.get(self.selected_index).cloned()
    }

    fn send(&mut self, intent: Intent) {
        if let Err(e) = self.handle.send(intent) {
            self.status_message = format!("Controller unavailable: {}", e);
        }
    }

    fn adjust_volume(&mut self, delta: i16) {
        // Volume is only ever changed from the keyboard, never echoed back
        let Some(current) = self.volume else {
            self.status_message = "No device connected".to_string();
            return;
        };
        let level = (current as i16 + delta).clamp(0, MAX_VOLUME as i16) as VolumeLevel;
        self.send(Intent::SetVolume(level));
    }

    fn submit_add_device(&mut self) {
        let input = std::mem::take(&mut self.input);
        self.input_mode = InputMode::Normal;

        let input = input.trim();
        if input.is_empty() {
            return;
        }

        let (address, name) = match input.split_once(char::is_whitespace) {
            Some((address, name)) => (address, Some(name.trim().to_string())),
            None => (input, None),
        };
        let (host, port) = match address.split_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), Some(port)),
                Err(_) => {
                    self.status_message = format!("Invalid port: {}", port);
                    return;
                }
            },
            None => (address.to_string(), None),
        };

        self.send(Intent::AddDevice { host, port, name });
    }

    fn apply(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Status(status) => self.status_message = status,
            ControllerEvent::Alert(alert) => self.alert = Some(alert),
            ControllerEvent::Devices(devices) => {
                self.devices = devices;
                if self.selected_index >= self.devices.len() {
                    self.selected_index = self.devices.len().saturating_sub(1);
                }
            }
            ControllerEvent::Connected(record) => {
                if let Some(index) = self.devices.iter().position(|d| *d == record.display_name()) {
                    self.selected_index = index;
                }
                self.connected = Some(record);
            }
            ControllerEvent::Disconnected => {
                self.connected = None;
                self.now_playing = None;
                self.volume = None;
            }
            ControllerEvent::NowPlaying(snapshot) => self.now_playing = Some(snapshot),
            ControllerEvent::Volume(level) => self.volume = Some(level),
            ControllerEvent::Artwork(artwork) => self.artwork = artwork,
        }
    }

    fn drain_events(&mut self, events: &mut EventReceiver) {
        loop {
            match events.try_recv() {
                Ok(Some(event)) => self.apply(event),
                Ok(None) => break,
                Err(SoundTouchError::Lagged(n)) => {
                    tracing::warn!("Display missed {} events", n);
                }
                Err(e) => {
                    tracing::warn!("Event stream: {}", e);
                    break;
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(7)])
        .split(f.size());

    let inner_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(outer_chunks[0]);

    render_devices(f, app, inner_chunks[0]);
    render_now_playing(f, app, inner_chunks[1]);
    render_status(f, app, outer_chunks[1]);
}

fn render_devices(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Devices (j/k select, Enter connect, d discover, a add, x remove) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.devices.is_empty() {
        let hint = "No saved devices.\n\nPress d to discover or a to add one by address.";
        let text = Paragraph::new(hint)
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
        return;
    }

    let connected = app.connected.as_ref().map(|r| r.display_name());
    let items: Vec<ListItem> = app
        .devices
        .iter()
        .map(|name| {
            let style = if connected.as_deref() == Some(name.as_str()) {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(name.clone(), style)))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected_index));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut state);
}

fn render_now_playing(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let block = Block::default()
        .title(" Now Playing (+/- vol, p power, r refresh, q quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let (Some(record), Some(state)) = (&app.connected, &app.now_playing) else {
        let text = Paragraph::new("Not connected")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, chunks[0]);
        return;
    };

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{}: ", label), Style::default().fg(Color::Yellow)),
            Span::raw(value),
        ])
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                "Device: ",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::raw(record.name.clone()),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Power: ", Style::default().fg(Color::Yellow)),
            Span::styled(
                state.power.to_string(),
                if state.power.is_on() {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
                },
            ),
        ]),
        field("Source", state.source.clone()),
    ];

    if let Some(title) = state.track.as_ref().or(state.item_name.as_ref()) {
        lines.push(field("Track", title.clone()));
    }
    if let Some(artist) = &state.artist {
        lines.push(field("Artist", artist.clone()));
    }
    if let Some(album) = &state.album {
        lines.push(field("Album", album.clone()));
    }
    if let (Some(position), Some(duration)) = (state.position, state.duration) {
        lines.push(field(
            "Time",
            format!("{} / {}", format_clock(position), format_clock(duration)),
        ));
    }
    if let Some(play_status) = &state.play_status {
        lines.push(field("Status", play_status.clone()));
    }

    lines.push(Line::from(""));
    lines.push(match &app.artwork {
        Some(artwork) => {
            let (width, height) = artwork.image.dimensions();
            field("Artwork", format!("{}x{}", width, height))
        }
        None => field("Artwork", "none".to_string()),
    });

    let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(text, chunks[0]);

    let volume = app.volume.unwrap_or(state.volume);
    let label = if state.muted {
        format!("{} (muted)", volume)
    } else {
        volume.to_string()
    };
    let gauge = Gauge::default()
        .block(Block::default().title(" Volume ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(volume.min(MAX_VOLUME) as u16)
        .label(label);
    f.render_widget(gauge, chunks[1]);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    if app.input_mode == InputMode::AddDevice {
        let block = Block::default()
            .title(" Add device: host[:port] [name] (Enter save, Esc cancel) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow));
        let text = Paragraph::new(format!("> {}", app.input)).block(block);
        f.render_widget(text, area);
        return;
    }

    if let Some(alert) = &app.alert {
        let block = Block::default()
            .title(" Error (any key to dismiss) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));
        let text = Paragraph::new(alert.clone())
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
        return;
    }

    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    // The terminal belongs to the UI, so logs go to a file
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)?;
    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;
    tracing::info!("Starting SoundTouch controller");

    let controller = Controller::with_http(ControllerConfig::default())?;
    let (handle, mut events) = controller.spawn();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(handle);

    // Main loop
    let res = run_app(&mut terminal, &mut app, &mut events).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.handle.shutdown().await;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut EventReceiver,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        app.drain_events(events);

        // Draw UI
        terminal.draw(|f| ui(f, app))?;

        // Handle input events (non-blocking)
        if !event::poll(std::time::Duration::from_millis(100))? {
            // Let the controller task run between frames
            tokio::task::yield_now().await;
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.alert.take().is_some() {
            continue;
        }

        match app.input_mode {
            InputMode::AddDevice => match key.code {
                KeyCode::Enter => app.submit_add_device(),
                KeyCode::Esc => {
                    app.input.clear();
                    app.input_mode = InputMode::Normal;
                }
                KeyCode::Backspace => {
                    app.input.pop();
                }
                KeyCode::Char(c) => app.input.push(c),
                _ => {}
            },
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                KeyCode::Enter => {
                    if let Some(name) = app.selected_device() {
                        app.send(Intent::Select(name));
                    }
                }
                KeyCode::Char('d') => app.send(Intent::Discover),
                KeyCode::Char('a') => app.input_mode = InputMode::AddDevice,
                KeyCode::Char('x') => {
                    if let Some(name) = app.selected_device() {
                        app.send(Intent::RemoveDevice(name));
                    }
                }
                KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_volume(VOLUME_STEP as i16),
                KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_volume(-(VOLUME_STEP as i16)),
                KeyCode::Char('p') => app.send(Intent::TogglePower),
                KeyCode::Char('r') => app.send(Intent::Refresh),
                KeyCode::Esc => app.send(Intent::Disconnect),
                _ => {}
            },
        }
    }
}
