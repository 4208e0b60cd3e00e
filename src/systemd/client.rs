// Systemd D-Bus client using zbus

use crate::error::{Result, UnitwatchError};
use crate::systemd::models::PropertiesSnapshot;
use crate::systemd::resilience::ConnectionManager;
use std::collections::HashMap;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::Connection;

const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Typed client for the systemd manager: exactly the calls the monitor
/// needs, nothing dynamic.
pub struct SystemdClient {
    connection: Connection,
    connection_manager: ConnectionManager,
}

impl SystemdClient {
    /// Connect to the system bus with the given retry settings.
    pub async fn with_manager(connection_manager: ConnectionManager) -> Result<Self> {
        let connection = connection_manager.connect_system().await?;

        Ok(Self {
            connection,
            connection_manager,
        })
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    async fn manager_proxy(&self) -> Result<zbus::Proxy<'static>> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            SYSTEMD_DESTINATION,
            SYSTEMD_PATH,
            MANAGER_INTERFACE,
        )
        .await
        .map_err(|e| UnitwatchError::SystemdConnection(e.to_string()))?;

        Ok(proxy)
    }

    /// Ask systemd to emit signals to us. Global setup failure here is
    /// fatal for the process.
    pub async fn subscribe(&self) -> Result<()> {
        let proxy = self.manager_proxy().await?;
        proxy
            .call::<_, _, ()>("Subscribe", &())
            .await
            .map_err(|e| UnitwatchError::SystemdConnection(format!("Subscribe failed: {}", e)))?;
        Ok(())
    }

    /// Best-effort counterpart to `subscribe`, used at shutdown.
    pub async fn unsubscribe(&self) -> Result<()> {
        let proxy = self.manager_proxy().await?;
        proxy
            .call::<_, _, ()>("Unsubscribe", &())
            .await
            .map_err(|e| UnitwatchError::SystemdConnection(format!("Unsubscribe failed: {}", e)))?;
        Ok(())
    }

    /// Resolve a unit name to its object path. Fails with `UnitNotFound`
    /// when the unit is not loaded.
    pub async fn get_unit(&self, unit_name: &str) -> Result<OwnedObjectPath> {
        let proxy = self.manager_proxy().await?;

        let unit_path = self
            .connection_manager
            .bounded(&format!("GetUnit for {}", unit_name), async {
                proxy
                    .call::<_, _, OwnedObjectPath>("GetUnit", &(unit_name,))
                    .await
                    .map_err(|e| map_unit_error(unit_name, e))
            })
            .await?;

        Ok(unit_path)
    }

    /// Fetch the current properties of a unit as one snapshot.
    ///
    /// Used for the one-time initial poll; live updates come from the
    /// PropertiesChanged stream instead.
    pub async fn get_unit_properties(&self, unit_name: &str) -> Result<PropertiesSnapshot> {
        let unit_path = self.get_unit(unit_name).await?;
        let props = self.get_all_properties(&unit_path).await?;

        let active_state = extract_string(&props, "ActiveState")
            .ok_or_else(|| UnitwatchError::UnitInfo(format!("{}: no ActiveState", unit_name)))?;

        Ok(PropertiesSnapshot {
            active_state,
            sub_state: extract_string(&props, "SubState").unwrap_or_else(|| "unknown".to_string()),
            exec_main_status: extract_i32(&props, "ExecMainStatus").unwrap_or(0),
            exec_main_code: extract_i32(&props, "ExecMainCode").unwrap_or(0),
            state_change_usec: extract_u64(&props, "StateChangeTimestamp").unwrap_or(0),
        })
    }

    /// Build a Properties proxy for a unit, for subscribing to its
    /// PropertiesChanged signal.
    pub async fn unit_properties_proxy(
        &self,
        unit_name: &str,
    ) -> Result<zbus::fdo::PropertiesProxy<'static>> {
        let unit_path = self.get_unit(unit_name).await?;

        let props_proxy = zbus::fdo::PropertiesProxy::builder(&self.connection)
            .destination(SYSTEMD_DESTINATION)?
            .path(unit_path)?
            .build()
            .await
            .map_err(|e| UnitwatchError::SystemdConnection(e.to_string()))?;

        Ok(props_proxy)
    }

    /// GetAll on the Properties interface of a unit object. An empty
    /// interface name returns properties across all interfaces, which
    /// covers both Unit and Service fields in one call.
    async fn get_all_properties(
        &self,
        unit_path: &OwnedObjectPath,
    ) -> Result<HashMap<String, OwnedValue>> {
        let props_proxy = zbus::fdo::PropertiesProxy::builder(&self.connection)
            .destination(SYSTEMD_DESTINATION)?
            .path(unit_path.as_str())?
            .build()
            .await
            .map_err(|e| UnitwatchError::SystemdConnection(e.to_string()))?;

        use zbus::zvariant::Optional;
        let props = self
            .connection_manager
            .bounded(&format!("GetAll for {}", unit_path.as_str()), async {
                let props = props_proxy
                    .get_all(Optional::default())
                    .await
                    .map_err(|e| UnitwatchError::UnitInfo(e.to_string()))?;
                Ok(props)
            })
            .await?;

        Ok(props)
    }
}

fn map_unit_error(unit_name: &str, err: zbus::Error) -> anyhow::Error {
    if let zbus::Error::MethodError(ref name, _, _) = err {
        if name.as_str() == "org.freedesktop.systemd1.NoSuchUnit" {
            return UnitwatchError::UnitNotFound(unit_name.to_string()).into();
        }
    }
    UnitwatchError::UnitInfo(format!("{}: {}", unit_name, err)).into()
}

/// Helpers to extract typed values from D-Bus property maps.
pub fn extract_string(props: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    props
        .get(key)
        .and_then(|v| v.downcast_ref::<String>().ok())
}

pub fn extract_i32(props: &HashMap<String, OwnedValue>, key: &str) -> Option<i32> {
    props.get(key).and_then(|v| v.downcast_ref::<i32>().ok())
}

pub fn extract_u64(props: &HashMap<String, OwnedValue>, key: &str) -> Option<u64> {
    props.get(key).and_then(|v| v.downcast_ref::<u64>().ok())
}

// Make SystemdClient cloneable for spawning tasks
impl Clone for SystemdClient {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            connection_manager: self.connection_manager.clone(),
        }
    }
}
