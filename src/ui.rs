//! Sinks for what the phone app would have put on screen.

use log::info;

use crate::proximity::Color;

pub trait Ui {
    fn set_background_color(&mut self, color: Color);
    fn set_status_text(&mut self, text: &str);
    fn show_alert(&mut self, title: &str, message: &str);
    fn schedule_local_notification(&mut self, message: &str);
}

/// Writes every UI update to the log.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn set_background_color(&mut self, color: Color) {
        info!("Background color: {:?}", color);
    }

    fn set_status_text(&mut self, text: &str) {
        info!("Status: {}", text);
    }

    fn show_alert(&mut self, title: &str, message: &str) {
        info!("[{}] {}", title, message);
    }

    fn schedule_local_notification(&mut self, message: &str) {
        info!("Notification: {}", message);
    }
}

impl Ui for Vec<Box<dyn Ui + Send>> {
    fn set_background_color(&mut self, color: Color) {
        self.iter_mut().for_each(|ui| ui.set_background_color(color));
    }

    fn set_status_text(&mut self, text: &str) {
        self.iter_mut().for_each(|ui| ui.set_status_text(text));
    }

    fn show_alert(&mut self, title: &str, message: &str) {
        self.iter_mut().for_each(|ui| ui.show_alert(title, message));
    }

    fn schedule_local_notification(&mut self, message: &str) {
        self.iter_mut()
            .for_each(|ui| ui.schedule_local_notification(message));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingUi, UiCall};
    use super::*;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = RecordingUi::default();
        let second = RecordingUi::default();
        let mut sinks: Vec<Box<dyn Ui + Send>> = vec![
            Box::new(first.clone()),
            Box::new(ConsoleUi),
            Box::new(second.clone()),
        ];

        sinks.set_background_color(Color::Green);
        sinks.show_alert("Welcome", "Welcome to our store");

        let expected = vec![
            UiCall::Color(Color::Green),
            UiCall::Alert("Welcome".into(), "Welcome to our store".into()),
        ];
        assert_eq!(first.take(), expected);
        assert_eq!(second.take(), expected);
    }
}
