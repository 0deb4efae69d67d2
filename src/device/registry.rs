//! Device registry
//!
//! Builds devices from layouts, names them and answers path queries over all
//! of their controls.

use std::collections::HashMap;
use tracing::debug;

use super::control::Control;
use super::layout::LayoutRegistry;
use super::path::{wildcard_match, BindingPath};
use super::{ControlId, DeviceId};
use crate::error::{InputError, Result};

/// A built device
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    /// Unique instance name (`Gamepad`, `Gamepad1`, ...)
    pub name: String,
    pub layout: String,
    pub usages: Vec<String>,
    controls: Vec<Control>,
    by_name: HashMap<String, usize>,
    default_state: Vec<u8>,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, index: usize) -> Option<&Control> {
        self.controls.get(index)
    }

    pub fn control_by_name(&self, name: &str) -> Option<&Control> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .and_then(|&i| self.controls.get(i))
    }

    pub fn state_size(&self) -> usize {
        self.default_state.len()
    }

    /// State image with every control at its default value
    pub fn default_state(&self) -> &[u8] {
        &self.default_state
    }

    pub fn has_usage(&self, usage: &str) -> bool {
        self.usages.iter().any(|u| u.eq_ignore_ascii_case(usage))
    }

    /// Instance-specific path of a control, e.g. `/Gamepad1/leftStick/x`
    pub fn control_path(&self, control: &Control) -> String {
        format!("/{}/{}", self.name, control.name)
    }
}

/// All devices currently present
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    layouts: LayoutRegistry,
    devices: Vec<Device>,
    next_id: u32,
}

impl DeviceRegistry {
    pub fn new(layouts: LayoutRegistry) -> Self {
        Self {
            layouts,
            devices: Vec::new(),
            next_id: 1,
        }
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    pub fn layouts_mut(&mut self) -> &mut LayoutRegistry {
        &mut self.layouts
    }

    /// Build a device from a registered layout
    pub fn add_device(&mut self, layout_name: &str) -> Result<DeviceId> {
        let items = self.layouts.resolve(layout_name)?;
        let layout = self
            .layouts
            .get(layout_name)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| layout_name.to_string());

        let id = DeviceId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        let name = self.unique_name(&layout);

        let mut controls: Vec<Control> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Control {
                id: ControlId {
                    device: id,
                    index: index as u32,
                },
                name: item.name,
                kind: item.kind,
                block: item.block,
                noisy: item.noisy,
                synthetic: item.synthetic,
                usages: item.usages,
                processors: item.processors,
                default_value: item.default_value,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        let by_name: HashMap<String, usize> = controls
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_ascii_lowercase(), i))
            .collect();

        // Link each control to its nearest declared ancestor
        for index in 0..controls.len() {
            let mut prefix = controls[index].name.to_ascii_lowercase();
            while let Some(slash) = prefix.rfind('/') {
                prefix.truncate(slash);
                if let Some(&parent) = by_name.get(&prefix) {
                    controls[index].parent = Some(parent);
                    controls[parent].children.push(index);
                    break;
                }
            }
        }

        let state_size = controls
            .iter()
            .map(|c| c.block.byte_end() as usize)
            .max()
            .unwrap_or(0);
        let mut default_state = vec![0u8; state_size];
        for control in controls.iter().filter(|c| !c.synthetic) {
            if let Some(value) = control.default_value {
                control.write_raw(&mut default_state, value.into())?;
            }
        }

        debug!("Added device {} ({}) with {} controls", name, layout, controls.len());
        self.devices.push(Device {
            id,
            name,
            layout,
            usages: Vec::new(),
            controls,
            by_name,
            default_state,
        });
        Ok(id)
    }

    fn unique_name(&self, layout: &str) -> String {
        let taken = |candidate: &str| {
            self.devices
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(candidate))
        };
        if !taken(layout) {
            return layout.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", layout, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| layout.to_string())
    }

    pub fn remove_device(&mut self, id: DeviceId) -> Option<Device> {
        let position = self.devices.iter().position(|d| d.id == id)?;
        let device = self.devices.remove(position);
        debug!("Removed device {}", device.name);
        Some(device)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.device(id.device)?.control(id.index as usize)
    }

    /// Control together with its device
    pub fn lookup(&self, id: ControlId) -> Option<(&Device, &Control)> {
        let device = self.device(id.device)?;
        Some((device, device.control(id.index as usize)?))
    }

    /// Instance path of a control, or a placeholder for stale ids
    pub fn control_path(&self, id: ControlId) -> String {
        match self.lookup(id) {
            Some((device, control)) => device.control_path(control),
            None => format!("<removed {}>", id),
        }
    }

    pub fn set_usages(&mut self, id: DeviceId, usages: Vec<String>) -> Result<()> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| InputError::UnknownDevice {
                device: id.to_string(),
            })?;
        device.usages = usages;
        Ok(())
    }

    fn device_matches(&self, device: &Device, path: &BindingPath) -> bool {
        let component = &path.device;
        if let Some(layout) = &component.layout {
            let same = device.layout.eq_ignore_ascii_case(layout);
            if !same && !self.layouts.is_a(&device.layout, layout) {
                return false;
            }
        }
        if !component.usages_match(|u| device.has_usage(u)) {
            return false;
        }
        match &component.name {
            None => true,
            Some(name) => wildcard_match(name, &device.name),
        }
    }

    /// Match `path` against the first `depth` name segments of `control`
    fn control_matches(
        &self,
        device: &Device,
        control: &Control,
        path: &BindingPath,
        depth: usize,
    ) -> bool {
        let segments: Vec<&str> = control.name.split('/').collect();
        if path.controls.len() != depth || depth > segments.len() {
            return false;
        }

        for (i, component) in path.controls.iter().enumerate() {
            if !component.name_matches(segments[i]) {
                return false;
            }
            if component.layout.is_none() && component.usages.is_empty() {
                continue;
            }
            // Layout and usage constraints apply to the control at this depth
            let ancestor_name = segments[..=i].join("/");
            let Some(ancestor) = device.control_by_name(&ancestor_name) else {
                return false;
            };
            if let Some(layout) = &component.layout {
                if !ancestor.kind.is_a(layout) {
                    return false;
                }
            }
            if !component.usages_match(|u| ancestor.has_usage(u)) {
                return false;
            }
        }
        true
    }

    /// Whether `path` names exactly this control
    pub fn matches(&self, path: &BindingPath, id: ControlId) -> bool {
        let Some((device, control)) = self.lookup(id) else {
            return false;
        };
        if !self.device_matches(device, path) {
            return false;
        }
        let depth = control.name.split('/').count();
        self.control_matches(device, control, path, depth)
    }

    /// Whether `path` names this control, one of its ancestors, or its device
    pub fn matches_prefix(&self, path: &BindingPath, id: ControlId) -> bool {
        let Some((device, control)) = self.lookup(id) else {
            return false;
        };
        if !self.device_matches(device, path) {
            return false;
        }
        if path.is_device_only() {
            return true;
        }
        self.control_matches(device, control, path, path.controls.len())
    }

    /// Every control matched by `path`, in device then declaration order
    pub fn find_controls(&self, path: &BindingPath) -> Vec<ControlId> {
        self.devices
            .iter()
            .filter(|d| self.device_matches(d, path))
            .flat_map(|d| d.controls.iter().map(|c| c.id))
            .filter(|&id| !path.is_device_only() && self.matches(path, id))
            .collect()
    }

    /// Every control of every device
    pub fn all_controls(&self) -> impl Iterator<Item = &Control> {
        self.devices.iter().flat_map(|d| d.controls.iter())
    }
}
