use cellular_dbus as mm;
use zbus::zvariant::OwnedObjectPath;

use crate::error::{Error, Result};

/// The SIM card active in a modem. Obtain via [`crate::Modem::active_sim`].
#[derive(Debug, Clone)]
pub struct Sim {
    conn: zbus::Connection,
    path: OwnedObjectPath,
}

impl Sim {
    pub(crate) fn new(conn: zbus::Connection, path: OwnedObjectPath) -> Self {
        Self { conn, path }
    }

    async fn proxy(&self) -> Result<mm::SimProxy<'static>> {
        Ok(mm::SimProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    /// Unlocks the SIM with its PIN.
    ///
    /// A rejected PIN fails with [`Error::WrongCredential`], a PIN the
    /// daemon refuses to even try (wrong length etc.) with
    /// [`Error::InvalidCredentialFormat`]. Both are recoverable by retrying
    /// with corrected input, within the card's retry limits.
    pub async fn send_pin(&self, pin: &str) -> Result<()> {
        self.proxy()
            .await?
            .send_pin(pin)
            .await
            .map_err(|err| classify_unlock_error(err, "PIN"))
    }

    /// Unlocks the SIM with its PUK and sets `pin` as the new PIN.
    /// Error mapping as in [`Sim::send_pin`].
    pub async fn send_puk(&self, puk: &str, pin: &str) -> Result<()> {
        self.proxy()
            .await?
            .send_puk(puk, pin)
            .await
            .map_err(|err| classify_unlock_error(err, "PUK"))
    }

    /// Whether this SIM is the active slot.
    pub async fn active(&self) -> Result<bool> {
        Ok(self.proxy().await?.active().await?)
    }

    pub async fn imsi(&self) -> Result<String> {
        Ok(self.proxy().await?.imsi().await?)
    }

    pub async fn iccid(&self) -> Result<String> {
        Ok(self.proxy().await?.sim_identifier().await?)
    }

    /// The home PLMN (MCC + MNC) stored on the card.
    pub async fn home_plmn(&self) -> Result<String> {
        Ok(self.proxy().await?.operator_identifier().await?)
    }

    pub async fn operator_name(&self) -> Result<String> {
        Ok(self.proxy().await?.operator_name().await?)
    }
}

fn classify_unlock_error(err: zbus::Error, credential: &str) -> Error {
    if let zbus::Error::MethodError(name, message, _) = &err {
        if name.as_str() == mm::MM_ERROR_INCORRECT_PASSWORD {
            return Error::WrongCredential;
        }
        if name.as_str() == mm::MM_ERROR_INCORRECT_PARAMETERS {
            return Error::InvalidCredentialFormat;
        }
        if let Some(message) = message {
            return Error::Sim(format!(
                "failed to unlock SIM with {credential}: {message}"
            ));
        }
    }
    Error::Sim(format!("failed to unlock SIM with {credential}: {err}"))
}
