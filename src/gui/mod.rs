//! The eframe/egui dashboard.
//!
//! Mirrors the bench layout the operators are used to:
//!
//! - **Controls row:** File ID and Piezo Start inputs, the fixed scan steps,
//!   Start/Stop buttons.
//! - **Indicators:** File ID, current piezo position, laser power and laser
//!   wavelength.
//! - **Plots:** one value-vs-coordinate plot per spectrum stream with a fixed
//!   vertical range. A failed read keeps the last trace and shows the error
//!   under the plot.
//!
//! The dashboard never blocks on the scan loop: it reads the latest
//! [`DashboardSnapshot`] from the watch channel each frame and queues
//! commands with [`ScanHandle::try_send`].

use crate::{
    config::{DisplayConfig, ScanConfig},
    display::{DashboardSnapshot, StreamView},
    scan::{ScanCommand, ScanHandle, ScanState},
};
use eframe::egui;
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};
use std::time::Duration;
use tokio::sync::watch;

/// Frame interval while idle; the loop publishes every `poll_interval_ms`.
const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

/// Main window.
pub struct ScanDashboard {
    handle: ScanHandle,
    snapshots: watch::Receiver<DashboardSnapshot>,
    display: DisplayConfig,
    step_record: f64,
    step_background: f64,
    file_id_input: u64,
    piezo_start_input: f64,
    status_line: String,
}

impl ScanDashboard {
    /// Creates the dashboard around a running controller.
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        handle: ScanHandle,
        scan: &ScanConfig,
        display: DisplayConfig,
    ) -> Self {
        Self {
            snapshots: handle.snapshots(),
            handle,
            display,
            step_record: scan.step_record,
            step_background: scan.step_background,
            file_id_input: scan.file_id_start,
            piezo_start_input: scan.piezo_start,
            status_line: String::from("Idle"),
        }
    }

    fn send(&mut self, command: ScanCommand, ok_message: String) {
        self.status_line = match self.handle.try_send(command) {
            Ok(()) => ok_message,
            Err(e) => format!("Command failed: {e}"),
        };
    }

    fn render_controls(&mut self, ui: &mut egui::Ui, state: ScanState) {
        ui.horizontal(|ui| {
            ui.label("File ID");
            ui.add(egui::DragValue::new(&mut self.file_id_input).speed(1.0));
            ui.separator();

            ui.label("Piezo Start");
            ui.add(
                egui::DragValue::new(&mut self.piezo_start_input)
                    .speed(0.01)
                    .fixed_decimals(2),
            );
            ui.separator();

            ui.label(format!("Piezo Step Record: {:.2}", self.step_record));
            ui.label(format!("Piezo Step Background: {:.2}", self.step_background));
            ui.separator();

            if ui.button("Start Scan").clicked() {
                let (command, _ack) = ScanCommand::start(self.file_id_input, self.piezo_start_input);
                self.send(command, "Scanning started".to_string());
            }
            if ui
                .add_enabled(state == ScanState::Scanning, egui::Button::new("Stop Scan"))
                .clicked()
            {
                let (command, _ack) = ScanCommand::stop();
                self.send(command, "Scanning stopped".to_string());
            }
        });
        ui.label(&self.status_line);
    }
}

impl eframe::App for ScanDashboard {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snapshot = self.snapshots.borrow_and_update().clone();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.heading("TE/TM OSA data collection Dashboard");
            self.render_controls(ui, snapshot.state);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            render_metrics(ui, &snapshot);
            ui.separator();

            let columns = snapshot.streams.len().max(1);
            ui.columns(columns, |uis| {
                for (ui, view) in uis.iter_mut().zip(snapshot.streams.iter()) {
                    render_stream(ui, view, &self.display);
                }
            });
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

fn render_metrics(ui: &mut egui::Ui, snapshot: &DashboardSnapshot) {
    let metrics = snapshot.metrics();
    ui.columns(metrics.len(), |uis| {
        for (ui, (label, value)) in uis.iter_mut().zip(metrics.iter()) {
            ui.group(|ui| {
                ui.label(*label);
                ui.heading(value);
            });
        }
    });
}

/// Render one spectrum with the configured vertical range
fn render_stream(ui: &mut egui::Ui, view: &StreamView, display: &DisplayConfig) {
    ui.label(view.title());

    match &view.trace {
        Some(trace) if !trace.is_empty() => {
            let coordinates = trace.coordinates();
            let x_min = coordinates.iter().copied().fold(f64::INFINITY, f64::min);
            let x_max = coordinates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let line = Line::new(PlotPoints::from_iter(trace.points()));

            Plot::new(format!("stream_{}", view.stream.file_index()))
                .view_aspect(1.5)
                .allow_drag(false)
                .allow_zoom(false)
                .allow_scroll(false)
                .x_axis_label(view.stream.coordinate_name())
                .y_axis_label("intensity")
                .show(ui, |plot_ui| {
                    plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                        [x_min, display.y_min],
                        [x_max, display.y_max],
                    ));
                    plot_ui.line(line);
                });
        }
        _ => {
            ui.label("No data available");
        }
    }

    if let Some(error) = &view.error {
        ui.colored_label(egui::Color32::RED, error);
    }
}
