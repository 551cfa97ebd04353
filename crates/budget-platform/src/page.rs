//! Page signals from the DOM: `focus` on the window and `visibilitychange`
//! on the document, the latter filtered down to becoming visible.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Event, EventTarget, VisibilityState, Window};

use budget_core::ports::{ListenerHandle, PageEvents, PageSignal};
use budget_types::{BudgetError, Result};

/// DOM event name a signal is derived from
pub fn dom_event(signal: PageSignal) -> &'static str {
    match signal {
        PageSignal::Focus => "focus",
        PageSignal::BecameVisible => "visibilitychange",
    }
}

struct Registration {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

pub struct BrowserPageEvents {
    window: Window,
    document: Document,
    next_handle: Cell<ListenerHandle>,
    registrations: RefCell<HashMap<ListenerHandle, Registration>>,
}

impl BrowserPageEvents {
    pub fn new() -> Result<Rc<Self>> {
        let window = web_sys::window()
            .ok_or_else(|| BudgetError::JsInterop("No window".to_string()))?;
        let document = window
            .document()
            .ok_or_else(|| BudgetError::JsInterop("No document".to_string()))?;
        Ok(Rc::new(Self {
            window,
            document,
            next_handle: Cell::new(0),
            registrations: RefCell::new(HashMap::new()),
        }))
    }

    pub fn is_visible(&self) -> bool {
        self.document.visibility_state() == VisibilityState::Visible
    }

    fn detach(registration: Registration) {
        let _ = registration.target.remove_event_listener_with_callback(
            registration.event,
            registration.closure.as_ref().unchecked_ref(),
        );
    }
}

impl PageEvents for BrowserPageEvents {
    fn listen(&self, signal: PageSignal, callback: Rc<dyn Fn()>) -> ListenerHandle {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);

        let (target, closure): (EventTarget, Closure<dyn FnMut(Event)>) = match signal {
            PageSignal::Focus => (
                self.window.clone().into(),
                Closure::wrap(Box::new(move |_event: Event| callback()) as Box<dyn FnMut(Event)>),
            ),
            PageSignal::BecameVisible => {
                let document = self.document.clone();
                (
                    self.document.clone().into(),
                    Closure::wrap(Box::new(move |_event: Event| {
                        if document.visibility_state() == VisibilityState::Visible {
                            callback();
                        }
                    }) as Box<dyn FnMut(Event)>),
                )
            }
        };

        let event = dom_event(signal);
        if let Err(e) = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
            log::warn!("Failed to listen for {}: {:?}", event, e);
        }
        self.registrations.borrow_mut().insert(
            handle,
            Registration {
                target,
                event,
                closure,
            },
        );
        handle
    }

    fn unlisten(&self, handle: ListenerHandle) {
        let removed = self.registrations.borrow_mut().remove(&handle);
        if let Some(registration) = removed {
            Self::detach(registration);
        }
    }
}

impl Drop for BrowserPageEvents {
    fn drop(&mut self) {
        for (_, registration) in self.registrations.borrow_mut().drain() {
            Self::detach(registration);
        }
    }
}
