// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use std::fmt;
use std::io;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments or configuration
    InvalidArgs(String),
    /// Capture device or subdevice not found or inaccessible
    DeviceNotFound(String),
    /// Media process library or encoder not available
    EncoderUnavailable(String),
    /// Output socket error (connection, broken pipe, etc.)
    SocketError(String),
    /// Operation timed out
    Timeout(String),
    /// General error from the hdmicap library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            CliError::EncoderUnavailable(msg) => write!(f, "Encoder unavailable: {}", msg),
            CliError::SocketError(msg) => write!(f, "Socket error: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::DeviceNotFound(_) => 3,
            CliError::EncoderUnavailable(_) => 4,
            CliError::SocketError(_) => 5,
            CliError::Timeout(_) => 6,
            CliError::General(_) => 1,
        }
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                CliError::DeviceNotFound(err.to_string())
            }
            io::ErrorKind::TimedOut => CliError::Timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => CliError::SocketError(err.to_string()),
            _ => CliError::General(format!("I/O error: {}", err)),
        }
    }
}

/// Map hdmicap::Error to CliError with appropriate exit codes
impl From<hdmicap::Error> for CliError {
    fn from(err: hdmicap::Error) -> Self {
        use hdmicap::Error;

        match err {
            Error::LibraryNotLoaded(lib_err) => {
                CliError::EncoderUnavailable(format!("Failed to load librockit: {}", lib_err))
            }
            Error::SymbolNotFound(sym) => {
                CliError::EncoderUnavailable(format!("Symbol not found: {}", sym))
            }
            Error::Mpi { .. } | Error::PoolExhausted => CliError::EncoderUnavailable(err.to_string()),
            Error::Io(io_err) => io_err.into(),
            Error::InvalidArgument(msg) => CliError::InvalidArgs(msg),
            Error::Json(json_err) => CliError::InvalidArgs(format!("Configuration: {}", json_err)),
            Error::NullPointer
            | Error::TryFromInt(_)
            | Error::ThreadSpawn(_) => CliError::General(err.to_string()),
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
