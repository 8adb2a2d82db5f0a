//! Transfer progress display
//!
//! Wraps the sink in an [`AsyncWrite`] adapter that feeds an indicatif bar
//! on stderr, so the engine stays unaware of presentation. Stdout is never
//! touched: in `cat` mode it carries the object bytes.

use std::pin::Pin;
use std::task::{Context, Poll};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWrite;

/// Sink adapter that advances a progress bar as bytes are written
pub struct ProgressSink<W> {
    inner: W,
    bar: ProgressBar,
}

impl<W> ProgressSink<W> {
    /// Wrap `inner`, displaying progress toward `total` bytes. A hidden bar
    /// is used in quiet mode so call sites stay unconditional.
    pub fn new(inner: W, total: u64, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:30.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
                )
                .expect("progress template is valid"),
            );
            bar
        };
        Self { inner, bar }
    }

    /// Clear the bar and hand back the sink
    pub fn into_inner(self) -> W {
        self.bar.finish_and_clear();
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressSink<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.bar.inc(written as u64);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
