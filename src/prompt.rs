use async_trait::async_trait;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::error::SelectionError;
use crate::DiscoveredDevice;

/// Picks the device to connect to.
#[async_trait]
pub trait Operator: Send {
    /// Index into `devices`, or `None` if the operator gave up.
    async fn choose(&mut self, devices: &[DiscoveredDevice]) -> Option<usize>;
}

/// Parse a 1-based choice from a list of `count` entries into a 0-based index.
pub fn parse_choice(input: &str, count: usize) -> Result<usize, SelectionError> {
    let input = input.trim();
    let choice: usize = input
        .parse()
        .map_err(|_| SelectionError::NotANumber(input.to_string()))?;

    if (1..=count).contains(&choice) {
        Ok(choice - 1)
    } else {
        Err(SelectionError::OutOfRange { choice, count })
    }
}

/// Numbered selection prompt on a line-based terminal.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> ConsolePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    async fn prompt(&mut self, devices: &[DiscoveredDevice]) -> io::Result<Option<usize>> {
        let mut listing = String::from("\nHeart rate devices found:\n");
        for (n, device) in devices.iter().enumerate() {
            listing.push_str(&format!("{}. {}\n", n + 1, device));
        }
        self.output.write_all(listing.as_bytes()).await?;

        let mut line = String::new();
        loop {
            self.output
                .write_all(b"\nSelect a device to connect (enter a number): ")
                .await?;
            self.output.flush().await?;

            line.clear();
            if self.input.read_line(&mut line).await? == 0 {
                return Ok(None);
            }

            match parse_choice(&line, devices.len()) {
                Ok(index) => {
                    let selected = format!("Selected: {}\n", devices[index]);
                    self.output.write_all(selected.as_bytes()).await?;
                    return Ok(Some(index));
                }
                Err(e) => {
                    log::debug!("Rejected selection: {}", e);
                    let hint = format!("Please enter a number between 1 and {}\n", devices.len());
                    self.output.write_all(hint.as_bytes()).await?;
                }
            }
        }
    }
}

#[async_trait]
impl<R, W> Operator for ConsolePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn choose(&mut self, devices: &[DiscoveredDevice]) -> Option<usize> {
        match self.prompt(devices).await {
            Ok(choice) => choice,
            Err(e) => {
                log::warn!("Device selection failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceId;

    fn devices() -> Vec<DiscoveredDevice> {
        vec![
            DiscoveredDevice::new(DeviceId::new("AA:01"), Some("Band 8".to_string())),
            DiscoveredDevice::new(DeviceId::new("AA:02"), None),
        ]
    }

    #[test]
    fn parses_in_range_choice() {
        assert_eq!(parse_choice("1", 2), Ok(0));
        assert_eq!(parse_choice(" 2 \n", 2), Ok(1));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            parse_choice("two", 2),
            Err(SelectionError::NotANumber("two".to_string()))
        );
        assert_eq!(
            parse_choice("0", 2),
            Err(SelectionError::OutOfRange { choice: 0, count: 2 })
        );
        assert_eq!(
            parse_choice("3", 2),
            Err(SelectionError::OutOfRange { choice: 3, count: 2 })
        );
        assert!(parse_choice("-1", 2).is_err());
        assert!(parse_choice("", 2).is_err());
    }

    #[tokio::test]
    async fn reprompts_until_valid() {
        let input: &[u8] = b"abc\n9\n2\n";
        let mut prompt = ConsolePrompt::new(input, Vec::new());

        assert_eq!(prompt.choose(&devices()).await, Some(1));

        let output = String::from_utf8(prompt.into_output()).unwrap();
        assert!(output.contains("1. Band 8 (AA:01)"));
        assert!(output.contains("2. unknown device (AA:02)"));
        assert_eq!(output.matches("Please enter a number between 1 and 2").count(), 2);
        assert!(output.contains("Selected: unknown device (AA:02)"));
    }

    #[tokio::test]
    async fn end_of_input_cancels() {
        let input: &[u8] = b"x\n";
        let mut prompt = ConsolePrompt::new(input, Vec::new());
        assert_eq!(prompt.choose(&devices()).await, None);
    }
}
