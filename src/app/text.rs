#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Escape {
    #[default]
    None,
    Start,
    Csi,
    Osc,
    OscEsc,
}

/// Strips terminal control sequences from backend text before it reaches the
/// transcript. The parser state survives between chunks, so a sequence split
/// across two network reads is still removed whole. Carriage returns are
/// dropped so CRLF bodies read as LF.
#[derive(Debug, Default)]
pub(super) struct RuntimeTextFilter {
    state: Escape,
}

impl RuntimeTextFilter {
    pub(super) fn push(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());

        for ch in text.chars() {
            self.state = match self.state {
                Escape::Start => match ch {
                    '[' => Escape::Csi,
                    ']' => Escape::Osc,
                    _ => Escape::None,
                },
                // CSI ends at a final byte in 0x40..=0x7E.
                Escape::Csi if ('@'..='~').contains(&ch) => Escape::None,
                Escape::Csi => Escape::Csi,
                // OSC ends at BEL or ST (ESC \).
                Escape::Osc if ch == '\u{7}' => Escape::None,
                Escape::Osc if ch == '\u{1b}' => Escape::OscEsc,
                Escape::Osc => Escape::Osc,
                Escape::OscEsc => Escape::None,
                Escape::None => match ch {
                    '\u{1b}' => Escape::Start,
                    '\n' | '\t' => {
                        out.push(ch);
                        Escape::None
                    }
                    c if c.is_control() => Escape::None,
                    c => {
                        out.push(c);
                        Escape::None
                    }
                },
            };
        }

        out
    }

    /// Forget a sequence left open by the previous reply.
    pub(super) fn reset(&mut self) {
        self.state = Escape::None;
    }
}

#[cfg(test)]
pub(super) fn sanitize_runtime_text(text: &str) -> String {
    RuntimeTextFilter::default().push(text)
}
